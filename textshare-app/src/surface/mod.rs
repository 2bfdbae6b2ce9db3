//! User-facing surfaces as plain state machines.
//!
//! Each surface owns the projections it displays and turns every action
//! into a [`Notice`](crate::notice::Notice). Dropping a surface releases
//! its subscriptions.

pub mod admin;
pub mod landing;
pub mod viewer;

pub use admin::{AdminSurface, AdminTab};
pub use landing::{Landing, Link};
pub use viewer::{LoadStatus, ViewerSurface};

/// Logical pages of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Admin,
    Viewer,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::Landing, Route::Admin, Route::Viewer];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Admin => "/admin",
            Route::Viewer => "/view",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Landing => "Text Sharing",
            Route::Admin => "Admin",
            Route::Viewer => "Shared Texts",
        }
    }

    /// Match a request path, ignoring any query string and trailing slash.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Route::ALL.into_iter().find(|route| route.path() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::from_path("/"), Some(Route::Landing));
        assert_eq!(Route::from_path("/admin"), Some(Route::Admin));
        assert_eq!(Route::from_path("/view/"), Some(Route::Viewer));
        assert_eq!(Route::from_path("/view?ref=qr"), Some(Route::Viewer));
        assert_eq!(Route::from_path("/settings"), None);
    }

    #[test]
    fn test_paths_round_trip() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
    }
}
