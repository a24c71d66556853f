//! Navigation guard: decides whether a view may render for the current session

use std::collections::BTreeSet;

use crate::auth::SessionStore;

/// Roles a route demands. Empty means any authenticated session will do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequirement {
    roles: BTreeSet<String>,
}

impl RouteRequirement {
    /// Any live session
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// A live session holding at least one of `roles`
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// The required roles
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Outcome of one navigation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Render the view
    Allow,
    /// No live session: go to the login view at this path
    Redirect(String),
    /// Live session, but none of the required roles
    Forbidden,
    /// No route matches the path
    NotFound,
}

/// Access rule attached to a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Rendered without a session (the login view)
    Public,
    /// Guarded by a requirement
    Guarded(RouteRequirement),
}

/// A navigable view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub access: Access,
}

/// Static table of routes, read-only once built
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route reachable without a session
    pub fn public(mut self, path: &str) -> Self {
        self.routes.push(Route {
            path: path.to_string(),
            access: Access::Public,
        });
        self
    }

    /// Add a guarded route
    pub fn guarded(mut self, path: &str, requirement: RouteRequirement) -> Self {
        self.routes.push(Route {
            path: path.to_string(),
            access: Access::Guarded(requirement),
        });
        self
    }

    /// The dashboard's routes
    pub fn dashboard(login_path: &str) -> Self {
        Self::new()
            .public(login_path)
            .guarded("/", RouteRequirement::authenticated())
            .guarded("/quotes", RouteRequirement::any_of(["Broker", "Manager"]))
            .guarded(
                "/proposals",
                RouteRequirement::any_of(["Broker", "Manager", "Auditor"]),
            )
            .guarded("/admin", RouteRequirement::any_of(["Admin"]))
    }

    /// Look up the route for `path`. A trailing slash is ignored.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let wanted = normalize(path);
        self.routes.iter().find(|r| normalize(&r.path) == wanted)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Evaluates navigation attempts against a session store.
///
/// Holds no decision state; every call consults the store afresh because
/// token expiry depends on the clock.
pub struct RouteGuard<'a> {
    store: &'a SessionStore,
    table: RouteTable,
    login_path: String,
}

impl<'a> RouteGuard<'a> {
    /// Guard the dashboard's routes, redirecting to the store's login path
    pub fn new(store: &'a SessionStore) -> Self {
        let login_path = store.options().login_path.clone();
        Self {
            store,
            table: RouteTable::dashboard(&login_path),
            login_path,
        }
    }

    /// Guard a custom route table
    pub fn with_table(store: &'a SessionStore, table: RouteTable) -> Self {
        Self {
            store,
            table,
            login_path: store.options().login_path.clone(),
        }
    }

    /// Decide whether a view with `requirement` may render.
    ///
    /// Authentication is checked first, so an empty requirement still
    /// redirects a dead session.
    pub fn authorize(&self, requirement: &RouteRequirement) -> Decision {
        authorize(requirement, self.store, &self.login_path)
    }

    /// Resolve `path` in the route table and authorize it
    pub fn navigate(&self, path: &str) -> Decision {
        let decision = match self.table.resolve(path) {
            None => Decision::NotFound,
            Some(Route {
                access: Access::Public,
                ..
            }) => Decision::Allow,
            Some(Route {
                access: Access::Guarded(requirement),
                ..
            }) => self.authorize(requirement),
        };
        log::debug!("Navigation to {} -> {:?}", path, decision);
        decision
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }
}

/// Decide a single navigation attempt
pub fn authorize(requirement: &RouteRequirement, store: &SessionStore, login_path: &str) -> Decision {
    if !store.is_live() {
        return Decision::Redirect(login_path.to_string());
    }
    if !requirement.is_empty() {
        let roles: Vec<&str> = requirement.roles.iter().map(String::as_str).collect();
        if !store.has_any_role(roles.as_slice()) {
            return Decision::Forbidden;
        }
    }
    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStorage, TokenPair};
    use crate::config::ClientOptions;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use reqwest::Client;
    use serde_json::json;
    use std::sync::Arc;

    async fn store(offset: i64, roles: &[&str]) -> SessionStore {
        let access = encode(
            &Header::default(),
            &json!({ "exp": chrono::Utc::now().timestamp() + offset, "roles": roles }),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();
        let raw = serde_json::to_string(&TokenPair { access, refresh: None }).unwrap();
        let store = SessionStore::new(
            "http://localhost:8000/api/v1",
            Client::new(),
            ClientOptions::default(),
            Arc::new(MemoryStorage::with_value(&raw)),
        );
        store.restore().await.unwrap();
        store
    }

    fn logged_out() -> SessionStore {
        SessionStore::new(
            "http://localhost:8000/api/v1",
            Client::new(),
            ClientOptions::default(),
            Arc::new(MemoryStorage::new()),
        )
    }

    #[tokio::test]
    async fn empty_requirement_needs_only_a_live_session() {
        let live = store(300, &[]).await;
        assert_eq!(
            RouteGuard::new(&live).authorize(&RouteRequirement::authenticated()),
            Decision::Allow
        );

        let dead = store(-300, &["Admin"]).await;
        assert_eq!(
            RouteGuard::new(&dead).authorize(&RouteRequirement::authenticated()),
            Decision::Redirect("/login".to_string())
        );

        let none = logged_out();
        assert_eq!(
            RouteGuard::new(&none).authorize(&RouteRequirement::authenticated()),
            Decision::Redirect("/login".to_string())
        );
    }

    #[tokio::test]
    async fn role_requirements() {
        let admin = RouteRequirement::any_of(["Admin"]);

        let broker = store(300, &["Broker"]).await;
        assert_eq!(RouteGuard::new(&broker).authorize(&admin), Decision::Forbidden);

        let manager = store(300, &["Admin", "Manager"]).await;
        assert_eq!(RouteGuard::new(&manager).authorize(&admin), Decision::Allow);
    }

    #[tokio::test]
    async fn dead_session_redirects_before_role_check() {
        let expired_admin = store(-1, &["Admin"]).await;
        assert_eq!(
            RouteGuard::new(&expired_admin).authorize(&RouteRequirement::any_of(["Admin"])),
            Decision::Redirect("/login".to_string())
        );
    }

    #[tokio::test]
    async fn dashboard_routes() {
        let auditor = store(300, &["Auditor"]).await;
        let guard = RouteGuard::new(&auditor);
        assert_eq!(guard.navigate("/"), Decision::Allow);
        assert_eq!(guard.navigate("/proposals"), Decision::Allow);
        assert_eq!(guard.navigate("/proposals/"), Decision::Allow);
        assert_eq!(guard.navigate("/quotes"), Decision::Forbidden);
        assert_eq!(guard.navigate("/admin"), Decision::Forbidden);
        assert_eq!(guard.navigate("/login"), Decision::Allow);
        assert_eq!(guard.navigate("/nowhere"), Decision::NotFound);

        let none = logged_out();
        let guard = RouteGuard::new(&none);
        assert_eq!(guard.navigate("/login"), Decision::Allow);
        assert_eq!(guard.navigate("/quotes"), Decision::Redirect("/login".to_string()));
    }

    #[test]
    fn custom_login_path() {
        let store = SessionStore::new(
            "http://api",
            Client::new(),
            ClientOptions::default().with_login_path("/entrar"),
            Arc::new(MemoryStorage::new()),
        );
        let guard = RouteGuard::with_table(
            &store,
            RouteTable::new().guarded("/reports", RouteRequirement::any_of(["Manager"])),
        );
        assert_eq!(guard.navigate("/reports"), Decision::Redirect("/entrar".to_string()));
        assert_eq!(guard.table().routes().len(), 1);
    }
}
