//! SQLite persistence for analysis sessions.
//!
//! RULE: Only store.rs talks to the database.
//! The analysis hands finished values to the store; it never executes SQL.

use crate::{
    config::AnalysisConfig,
    error::{ChainError, ChainResult},
    panel::Panel,
    transition::{TransitionCounts, TransitionEstimate, TransitionMatrix},
    types::{State, STATE_COUNT},
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the session database at `path`.
    pub fn open(path: &str) -> ChainResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ChainResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ChainResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_session.sql"))?;
        Ok(())
    }

    // ── Session ────────────────────────────────────────────────

    pub fn insert_session(&self, session_id: &str, config: &AnalysisConfig, version: &str) -> ChainResult<()> {
        self.conn.execute(
            "INSERT INTO session (session_id, version, created_at, config_json) VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                version,
                chrono::Utc::now().to_rfc3339(),
                serde_json::to_string(config)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_config(&self, session_id: &str) -> ChainResult<Option<AnalysisConfig>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM session WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(ChainError::from)).transpose()
    }

    // ── Panel ──────────────────────────────────────────────────

    /// Persist every panel cell in one transaction. Returns rows written.
    pub fn save_panel(&self, session_id: &str, panel: &Panel) -> ChainResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO panel_cell (
                    session_id, customer_id, month_index, amount, event_count,
                    had_activity, months_since_last_activity, state, next_state
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?;
            for cell in panel.cells() {
                stmt.execute(params![
                    session_id,
                    cell.customer_id,
                    cell.month_index,
                    cell.amount,
                    cell.event_count,
                    cell.had_activity,
                    cell.months_since_last_activity,
                    cell.state.code(),
                    cell.next_state.map(State::code),
                ])?;
            }
        }
        tx.commit()?;
        Ok(panel.len())
    }

    pub fn panel_cell_count(&self, session_id: &str) -> ChainResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM panel_cell WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Stored cell counts per state, in matrix order.
    pub fn state_counts(&self, session_id: &str) -> ChainResult<[u64; STATE_COUNT]> {
        let mut stmt = self.conn.prepare(
            "SELECT state, COUNT(*) FROM panel_cell WHERE session_id = ?1 GROUP BY state",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = [0u64; STATE_COUNT];
        for (code, n) in rows {
            let state = parse_state(&code)?;
            counts[state.index()] = n as u64;
        }
        Ok(counts)
    }

    // ── Transition estimate ────────────────────────────────────

    pub fn save_transition_estimate(&self, session_id: &str, estimate: &TransitionEstimate) -> ChainResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for from in State::ALL {
            for to in State::ALL {
                tx.execute(
                    "INSERT INTO transition_estimate (session_id, from_state, to_state, count, probability)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(session_id, from_state, to_state) DO UPDATE SET
                        count = excluded.count, probability = excluded.probability",
                    params![
                        session_id,
                        from.code(),
                        to.code(),
                        estimate.counts.get(from, to) as i64,
                        estimate.matrix.get(from, to),
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_transition_rows(&self, session_id: &str) -> ChainResult<Vec<(State, State, i64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_state, to_state, count, probability
             FROM transition_estimate WHERE session_id = ?1",
        )?;
        let raw = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(f, t, c, p)| Ok((parse_state(&f)?, parse_state(&t)?, c, p)))
            .collect()
    }

    pub fn load_transition_matrix(&self, session_id: &str) -> ChainResult<Option<TransitionMatrix>> {
        let rows = self.load_transition_rows(session_id)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut matrix = [[0.0; STATE_COUNT]; STATE_COUNT];
        for (from, to, _, p) in rows {
            matrix[from.index()][to.index()] = p;
        }
        TransitionMatrix::from_rows(matrix).map(Some)
    }

    pub fn load_transition_counts(&self, session_id: &str) -> ChainResult<Option<TransitionCounts>> {
        let rows = self.load_transition_rows(session_id)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut counts = TransitionCounts::new();
        for (from, to, c, _) in rows {
            counts.counts[from.index()][to.index()] = c as u64;
        }
        Ok(Some(counts))
    }

    // ── Reports ────────────────────────────────────────────────

    /// Store a serializable report under `kind`, replacing any previous one.
    pub fn save_report<T: Serialize>(&self, session_id: &str, kind: &str, report: &T) -> ChainResult<()> {
        self.conn.execute(
            "INSERT INTO report (session_id, kind, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id, kind) DO UPDATE SET payload = excluded.payload",
            params![session_id, kind, serde_json::to_string(report)?],
        )?;
        Ok(())
    }

    pub fn load_report<T: DeserializeOwned>(&self, session_id: &str, kind: &str) -> ChainResult<Option<T>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM report WHERE session_id = ?1 AND kind = ?2",
                params![session_id, kind],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| serde_json::from_str(&p).map_err(ChainError::from)).transpose()
    }
}

fn parse_state(code: &str) -> ChainResult<State> {
    State::from_label(code)
        .ok_or_else(|| ChainError::Other(anyhow::anyhow!("unknown state code in store: {code}")))
}
