use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::tasks::spawn_best_effort;
use crate::db::queries;

/// Strips every whitespace character from a phone number.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Canonical player id for (club, phone). A failure is logged and yields
/// `None`; the booking proceeds without a player link.
pub fn find_or_create(
    conn: &Connection,
    club_id: &str,
    name: &str,
    email: Option<&str>,
    phone: &str,
) -> Option<String> {
    match queries::upsert_player(conn, club_id, name, email, phone) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(club_id = %club_id, error = %e, "failed to resolve player");
            None
        }
    }
}

/// Bumps booking count and spend in the background.
pub fn record_booking_stats(
    db: Arc<Mutex<Connection>>,
    player_id: String,
    amount: i64,
    at: NaiveDateTime,
) {
    spawn_best_effort("player_stats", async move {
        let conn = db
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))?;
        if !queries::record_player_booking(&conn, &player_id, amount, at)? {
            tracing::warn!(player_id = %player_id, "player vanished before stats update");
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" 55 1234\t5678 "), "5512345678");
        assert_eq!(normalize_phone("+52 55 1234 5678"), "+525512345678");
    }
}
