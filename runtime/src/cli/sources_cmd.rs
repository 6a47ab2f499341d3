//! `nad sources`: list the configured source catalog.

use crate::cli::output::{self, Styled};
use crate::config::NadConfig;
use crate::normalize::field_map::CanonicalField;
use anyhow::Result;

pub fn run(config: &NadConfig) -> Result<()> {
    if output::is_json() {
        output::print_json(&serde_json::to_value(&config.sources)?);
        return Ok(());
    }

    let s = Styled::new();
    output::print_header(&s);

    if config.sources.is_empty() {
        output::print_check(s.warn_sym(), "Sources:", "none configured");
        return Ok(());
    }

    for source in &config.sources {
        let mapped = source.field_map.len();
        let symbol = if mapped == 0 { s.warn_sym() } else { s.ok_sym() };
        output::print_check(symbol, "Source:", source.label());
        output::print_detail(&format!(
            "layer {}, {mapped}/{} canonical fields",
            source.layer,
            CanonicalField::ALL.len()
        ));

        let missing: Vec<&str> = CanonicalField::ALL
            .iter()
            .filter(|f| !source.field_map.contains_key(*f))
            .map(|f| f.as_str())
            .collect();
        if !missing.is_empty() {
            output::print_detail(&s.dim(&format!("unmapped: {}", missing.join(", "))));
        }
    }
    Ok(())
}
