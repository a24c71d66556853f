use dotenv::dotenv;
use shamah_client::auth::FileStorage;
use shamah_client::config::ClientOptions;
use shamah_client::guard::Decision;
use shamah_client::Shamah;
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    let api_url = env::var("SHAMAH_API_URL")
        .unwrap_or_else(|_| "http://localhost:8000/api/v1".to_string());
    let username = env::var("SHAMAH_USERNAME").expect("SHAMAH_USERNAME must be set");
    let password = env::var("SHAMAH_PASSWORD").expect("SHAMAH_PASSWORD must be set");

    let options = ClientOptions::from_env();
    let storage = FileStorage::new(env::temp_dir().join("shamah"), &options.storage_key);
    let shamah = Shamah::new_with_options(&api_url, options, Arc::new(storage));

    println!("Starting session example against {}", api_url);

    match shamah.session().restore().await? {
        Some(_) if shamah.session().is_live() => println!("Restored a live session"),
        Some(_) => println!("Restored session has expired, logging in again"),
        None => println!("No saved session"),
    }

    if !shamah.session().is_live() {
        let session = shamah.session().login(&username, &password).await?;
        println!(
            "Logged in as {} with roles {:?}",
            session.claims.username.as_deref().unwrap_or(username.as_str()),
            session.claims.roles.as_deref().unwrap_or(&[])
        );
    }

    let guard = shamah.guard();
    for route in guard.table().routes() {
        let verdict = match guard.navigate(&route.path) {
            Decision::Allow => "allowed".to_string(),
            Decision::Forbidden => "forbidden".to_string(),
            Decision::Redirect(to) => format!("redirect to {}", to),
            Decision::NotFound => "not found".to_string(),
        };
        println!("  {:<12} {}", route.path, verdict);
    }

    if guard.navigate("/proposals") == Decision::Allow {
        println!("\nPolling proposals for 12 seconds");
        let handle = shamah.api().poll_proposals(|result| match result {
            Ok(proposals) => {
                for p in &proposals {
                    println!("  #{} {:?}", p.id, p.status);
                }
                println!("  ({} proposals)", proposals.len());
            }
            Err(err) => println!("  poll failed: {}", err),
        });
        tokio::time::sleep(Duration::from_secs(12)).await;
        handle.cancel();
    }

    shamah.session().logout().await?;
    println!("Logged out");

    Ok(())
}
