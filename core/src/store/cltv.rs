use super::ScoreStore;
use crate::{
    cltv::{CltvRecord, CltvSegment},
    error::{ScoreError, ScoreResult},
};
use rusqlite::params;

fn parse_segment(raw: Option<String>) -> ScoreResult<Option<CltvSegment>> {
    raw.map(|s| {
        CltvSegment::parse(&s)
            .ok_or_else(|| ScoreError::Other(anyhow::anyhow!("unknown CLTV segment '{s}' in store")))
    })
    .transpose()
}

impl ScoreStore {
    // ── CLTV export ────────────────────────────────────────────

    /// Write the CLTV table for one horizon. Re-exporting a horizon
    /// replaces its rows.
    pub fn insert_cltv_records(
        &self,
        run_id: &str,
        horizon_tag: &str,
        records: &[CltvRecord],
    ) -> ScoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM cltv_record WHERE run_id = ?1 AND horizon_tag = ?2",
            params![run_id, horizon_tag],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cltv_record (
                    run_id, horizon_tag, customer_id, recency_cltv_weekly, t_weekly,
                    frequency, monetary_cltv_avg, exp_sales_3_months, exp_sales_6_months,
                    exp_average_value, clv, segment
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            )?;
            for r in records {
                stmt.execute(params![
                    run_id,
                    horizon_tag,
                    r.customer_id,
                    r.recency_cltv_weekly,
                    r.tenure_weekly,
                    r.frequency,
                    r.monetary_cltv_avg,
                    r.exp_sales_3_months,
                    r.exp_sales_6_months,
                    r.exp_average_value,
                    r.clv,
                    r.segment.map(|s| s.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn cltv_records(&self, run_id: &str, horizon_tag: &str) -> ScoreResult<Vec<CltvRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, recency_cltv_weekly, t_weekly, frequency, monetary_cltv_avg,
                    exp_sales_3_months, exp_sales_6_months, exp_average_value, clv, segment
             FROM cltv_record
             WHERE run_id = ?1 AND horizon_tag = ?2
             ORDER BY customer_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, horizon_tag], |row| {
                Ok((
                    CltvRecord {
                        customer_id:         row.get(0)?,
                        recency_cltv_weekly: row.get(1)?,
                        tenure_weekly:       row.get(2)?,
                        frequency:           row.get(3)?,
                        monetary_cltv_avg:   row.get(4)?,
                        exp_sales_3_months:  row.get(5)?,
                        exp_sales_6_months:  row.get(6)?,
                        exp_average_value:   row.get(7)?,
                        clv:                 row.get(8)?,
                        segment:             None,
                    },
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut record, segment)| {
                record.segment = parse_segment(segment)?;
                Ok(record)
            })
            .collect()
    }

    /// Customers per CLTV segment, A first. Unsegmented rows are not counted.
    pub fn cltv_segment_counts(
        &self,
        run_id: &str,
        horizon_tag: &str,
    ) -> ScoreResult<Vec<(CltvSegment, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT segment, COUNT(*) FROM cltv_record
             WHERE run_id = ?1 AND horizon_tag = ?2 AND segment IS NOT NULL
             GROUP BY segment ORDER BY segment ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, horizon_tag], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(segment, count)| {
                let segment = parse_segment(Some(segment))?
                    .ok_or_else(|| ScoreError::Other(anyhow::anyhow!("missing CLTV segment")))?;
                Ok((segment, count))
            })
            .collect()
    }
}
