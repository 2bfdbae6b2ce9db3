//! Entry page linking to the admin and viewer pages.

use super::Route;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub label: &'static str,
    pub route: Route,
}

#[derive(Debug, Clone)]
pub struct Landing {
    links: Vec<Link>,
}

impl Landing {
    pub fn new() -> Self {
        Self {
            links: vec![
                Link {
                    label: "Manage texts",
                    route: Route::Admin,
                },
                Link {
                    label: "View shared texts",
                    route: Route::Viewer,
                },
            ],
        }
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Absolute link targets under `origin` (e.g. `http://localhost:3000`).
    pub fn hrefs(&self, origin: &str) -> Vec<String> {
        let origin = origin.trim_end_matches('/');
        self.links
            .iter()
            .map(|link| format!("{origin}{}", link.route.path()))
            .collect()
    }

    /// Follow a link by path.
    pub fn navigate(&self, path: &str) -> Option<Route> {
        Route::from_path(path).filter(|route| self.links.iter().any(|l| l.route == *route))
    }
}

impl Default for Landing {
    fn default() -> Self {
        Self::new()
    }
}
