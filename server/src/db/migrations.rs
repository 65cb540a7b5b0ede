use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
///
/// Timestamps are Unix milliseconds (UTC) so expiry checks are plain integer
/// comparisons. `encrypted_data` is NULL while a code is reserved but not yet
/// filled.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Ephemeral content store

CREATE TABLE contents (
    access_code TEXT PRIMARY KEY,
    encrypted_data TEXT,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE INDEX idx_contents_expires_at ON contents(expires_at);
",
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
