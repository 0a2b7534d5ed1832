use std::fmt::Write;

use weather_aggregator::{AggregateResult, NormalizedResult, Outcome};

/// Human-readable report, successes first, each group sorted by provider.
pub fn render(results: &AggregateResult) -> String {
    if results.is_empty() {
        return "No providers configured.\n".to_string();
    }

    let mut ordered: Vec<&NormalizedResult> = results.iter().collect();
    ordered.sort_by(|a, b| {
        b.is_success()
            .cmp(&a.is_success())
            .then_with(|| a.provider.cmp(&b.provider))
    });

    let mut out = String::new();
    for result in ordered {
        let _ = match &result.outcome {
            Outcome::Success(obs) => writeln!(
                out,
                "{}: {:.1}°C, {}, pressure {:.1} hPa, humidity {}%, visibility {:.0} m (observed {})",
                result.provider,
                obs.temperature_c,
                obs.description,
                obs.pressure_hpa,
                obs.humidity_pct,
                obs.visibility_m,
                obs.observed_at.format("%Y-%m-%d %H:%M UTC"),
            ),
            Outcome::Failure(failure) => writeln!(
                out,
                "{}: error {}: {}",
                result.provider, failure.status_code, failure.message
            ),
        };
    }
    out
}
