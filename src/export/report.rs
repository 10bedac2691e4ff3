use std::io::Write;

use crate::state::Session;

/// Generate a text report similar to mtr --report
pub fn generate_report<W: Write>(session: &Session, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "hopwatch report for {}", session.target)?;
    writeln!(writer, "Started: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer, "State: {:?}", session.state)?;
    writeln!(writer)?;

    writeln!(
        writer,
        "{:>3}  {:<40} {:>6} {:>6} {:>8} {:>8} {:>8}",
        "#", "Host", "Loss%", "Sent", "Avg", "Min", "Max"
    )?;
    writeln!(writer, "{}", "-".repeat(86))?;

    // Only show hops up to the destination
    let last = session.dest_hop.unwrap_or(session.config.max_hops);
    for hop in session.hops().filter(|h| h.hop_number() <= last) {
        let host = match hop.hostname() {
            Some(name) => format!("{} ({})", name, hop.ip()),
            None => hop.ip().to_string(),
        };
        let fmt = |rtt: Option<f64>| rtt.map_or_else(|| "-".to_string(), |v| format!("{:.1}ms", v));

        writeln!(
            writer,
            "{:>3}  {:<40} {:>5.1}% {:>6} {:>8} {:>8} {:>8}",
            hop.hop_number(),
            host,
            hop.loss_pct(),
            hop.history().len(),
            fmt(hop.mean_rtt()),
            fmt(hop.min_rtt()),
            fmt(hop.max_rtt()),
        )?;
    }

    Ok(())
}
