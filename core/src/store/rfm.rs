use super::ScoreStore;
use crate::{
    error::{ScoreError, ScoreResult},
    rfm::{RfmRecord, RfmSegment},
    types::CustomerId,
};
use rusqlite::params;

fn parse_segment(raw: &str) -> ScoreResult<RfmSegment> {
    RfmSegment::parse(raw)
        .ok_or_else(|| ScoreError::Other(anyhow::anyhow!("unknown RFM segment '{raw}' in store")))
}

impl ScoreStore {
    // ── RFM ────────────────────────────────────────────────────

    pub fn insert_rfm_records(&self, run_id: &str, records: &[RfmRecord]) -> ScoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rfm_record (
                    run_id, customer_id, recency, frequency, monetary,
                    recency_score, frequency_score, monetary_score, rf_code, segment
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                ON CONFLICT(run_id, customer_id) DO UPDATE SET
                    recency = excluded.recency,
                    frequency = excluded.frequency,
                    monetary = excluded.monetary,
                    recency_score = excluded.recency_score,
                    frequency_score = excluded.frequency_score,
                    monetary_score = excluded.monetary_score,
                    rf_code = excluded.rf_code,
                    segment = excluded.segment",
            )?;
            for r in records {
                stmt.execute(params![
                    run_id,
                    r.customer_id,
                    r.recency,
                    r.frequency,
                    r.monetary,
                    r.recency_score,
                    r.frequency_score,
                    r.monetary_score,
                    r.rf_code,
                    r.segment.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn rfm_records(&self, run_id: &str) -> ScoreResult<Vec<RfmRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, recency, frequency, monetary, recency_score,
                    frequency_score, monetary_score, rf_code, segment
             FROM rfm_record WHERE run_id = ?1
             ORDER BY customer_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, u8>(4)?,
                    row.get::<_, u8>(5)?,
                    row.get::<_, u8>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(customer_id, recency, frequency, monetary, rs, fs, ms, rf_code, segment)| {
                Ok(RfmRecord {
                    customer_id,
                    recency,
                    frequency,
                    monetary,
                    recency_score: rs,
                    frequency_score: fs,
                    monetary_score: ms,
                    rf_code,
                    segment: parse_segment(&segment)?,
                })
            })
            .collect()
    }

    /// Customers per RFM segment, largest first.
    pub fn rfm_segment_counts(&self, run_id: &str) -> ScoreResult<Vec<(RfmSegment, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment, COUNT(*) AS n FROM rfm_record
             WHERE run_id = ?1
             GROUP BY segment ORDER BY n DESC, segment ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(segment, count)| Ok((parse_segment(&segment)?, count)))
            .collect()
    }

    // ── Action exports ─────────────────────────────────────────

    /// Store one action's customer list, replacing any earlier export
    /// under the same name.
    pub fn insert_action_export(
        &self,
        run_id: &str,
        export_name: &str,
        customer_ids: &[CustomerId],
    ) -> ScoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM action_export WHERE run_id = ?1 AND export_name = ?2",
            params![run_id, export_name],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO action_export (run_id, export_name, customer_id)
                 VALUES (?1, ?2, ?3)",
            )?;
            for id in customer_ids {
                stmt.execute(params![run_id, export_name, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn action_export(&self, run_id: &str, export_name: &str) -> ScoreResult<Vec<CustomerId>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id FROM action_export
             WHERE run_id = ?1 AND export_name = ?2
             ORDER BY customer_id ASC",
        )?;
        let ids = stmt
            .query_map(params![run_id, export_name], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
