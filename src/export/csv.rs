use anyhow::Result;
use std::io::Write;

use crate::state::{Bucket, Session};

fn ms(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Export a per-hop summary of the session as CSV
pub fn export_csv<W: Write>(session: &Session, mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "hop,ip,hostname,loss_pct,sent,recv,avg_ms,min_ms,max_ms"
    )?;

    for hop in session.hops() {
        writeln!(
            writer,
            "{},{},{},{:.1},{},{},{},{},{}",
            hop.hop_number(),
            hop.ip(),
            escape_csv(hop.hostname().unwrap_or_default()),
            hop.loss_pct(),
            hop.history().len(),
            hop.success_count(),
            ms(hop.mean_rtt()),
            ms(hop.min_rtt()),
            ms(hop.max_rtt()),
        )?;
    }

    Ok(())
}

/// Export aggregated buckets of one hop as CSV
pub fn export_buckets_csv<W: Write>(buckets: &[Bucket], mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "timestamp,avg_ms,min_ms,max_ms,success,failed,total,any_timeout"
    )?;

    for b in buckets {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            b.bucket_start,
            ms(b.avg_rtt),
            ms(b.min_rtt),
            ms(b.max_rtt),
            b.success_count,
            b.failure_count,
            b.total_count,
            b.had_any_timeout,
        )?;
    }

    Ok(())
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
