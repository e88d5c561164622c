use anyhow::Context;
use rusqlite::Connection;

/// Ordered list of schema migrations, compiled into the binary so an in-memory
/// database built from any working directory gets the same schema.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_init.sql",
    include_str!("../../migrations/001_init.sql"),
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_overlap_trigger_rejects_double_booking() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO clubs (id, name) VALUES ('club-1', 'Club');
             INSERT INTO courts (id, club_id, name) VALUES ('court-1', 'club-1', 'Cancha 1');
             INSERT INTO bookings (id, club_id, court_id, date, start_time, end_time, duration,
                player_name, player_phone, price, created_at, updated_at)
             VALUES ('b1', 'club-1', 'court-1', '2030-01-10', '10:00', '11:30', 90,
                'Ana', '5512345678', 50000, 'now', 'now');",
        )
        .unwrap();

        let overlapping = conn.execute(
            "INSERT INTO bookings (id, club_id, court_id, date, start_time, end_time, duration,
                player_name, player_phone, price, created_at, updated_at)
             VALUES ('b2', 'club-1', 'court-1', '2030-01-10', '11:00', '12:00', 60,
                'Luis', '5512345679', 40000, 'now', 'now')",
            [],
        );
        assert!(overlapping.is_err());

        let adjacent = conn.execute(
            "INSERT INTO bookings (id, club_id, court_id, date, start_time, end_time, duration,
                player_name, player_phone, price, created_at, updated_at)
             VALUES ('b3', 'club-1', 'court-1', '2030-01-10', '11:30', '12:30', 60,
                'Luis', '5512345679', 40000, 'now', 'now')",
            [],
        );
        assert!(adjacent.is_ok());
    }
}
