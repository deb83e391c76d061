//! Route surface: one path per stage plus the alternate branch.

use crate::session::Stage;

/// Query parameter the navigation token travels in.
pub const TOKEN_PARAM: &str = "token";

/// A known route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Stage(Stage),
    /// The alternate branch shown to blocked sessions.
    Blocked,
}

impl Route {
    pub const BLOCKED_PATH: &'static str = "/unavailable";

    pub fn path(&self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.path(),
            Self::Blocked => Self::BLOCKED_PATH,
        }
    }

    /// Label handed to the verification module, the path without its slash.
    pub fn label(&self) -> &'static str {
        &self.path()[1..]
    }

    /// Match a path (query string already removed). The root and anything
    /// unrecognised yield `None`.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        if path == Self::BLOCKED_PATH {
            return Some(Self::Blocked);
        }
        Stage::ALL
            .into_iter()
            .find(|stage| stage.path() == path)
            .map(Self::Stage)
    }
}

/// A route plus the optional navigation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub route: Route,
    pub token: Option<String>,
}

impl Location {
    pub fn new(route: Route) -> Self {
        Self { route, token: None }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Parse `path[?query]`. `None` when the path is not a known route.
    pub fn parse(url: &str) -> Option<Self> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let route = Route::from_path(path)?;
        let token = query.and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == TOKEN_PARAM)
                .map(|(_, value)| value.to_string())
                .filter(|value| !value.is_empty())
        });
        Some(Self { route, token })
    }

    pub fn to_url(&self) -> String {
        match &self.token {
            Some(token) => format!("{}?{TOKEN_PARAM}={token}", self.route.path()),
            None => self.route.path().to_string(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_url())
    }
}
