use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum DatabaseType {
    MySQL,
    PostgreSQL,
    SQLite,
    MongoDB,
}

impl DatabaseType {
    /// Guess the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.trim().to_ascii_lowercase();
        if lower.starts_with("mysql://") {
            Some(Self::MySQL)
        } else if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("sqlite:") || lower.starts_with("file:") {
            Some(Self::SQLite)
        } else if lower.starts_with("mongodb://") || lower.starts_with("mongodb+srv://") {
            Some(Self::MongoDB)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
            Self::MongoDB => "MongoDB",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    // MongoDB sort direction
    pub fn as_mongo(self) -> i32 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }
}

/// Lifecycle of a table view.
///
/// `Filtering` and `Paginating` are only observable while a fetch is in
/// flight; every completed operation lands back in `Ready`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    Loading,
    Ready,
    Filtering,
    Paginating,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_backend_from_scheme() {
        assert_eq!(
            DatabaseType::from_url("mysql://root:pw@tcp(localhost:3306)/shop"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_url("postgres://u:p@localhost:5432/db?sslmode=disable"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_url("sqlite:///tmp/a.db"), Some(DatabaseType::SQLite));
        assert_eq!(DatabaseType::from_url("file:data.db"), Some(DatabaseType::SQLite));
        assert_eq!(
            DatabaseType::from_url("mongodb+srv://cluster0.example.net/app"),
            Some(DatabaseType::MongoDB)
        );
        assert_eq!(DatabaseType::from_url("redis://localhost"), None);
    }
}
