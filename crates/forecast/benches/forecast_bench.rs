//! Throughput of the full forecast pipeline over the built-in tables.
//! Run with: cargo bench -p campaign-forecast

use campaign_core::{CampaignInput, ForecastConfig};
use campaign_forecast::ForecastEngine;
use std::collections::BTreeMap;

fn sample_inputs() -> Vec<CampaignInput> {
    let mut mix = BTreeMap::new();
    mix.insert("mobile".to_string(), 0.8);
    mix.insert("desktop".to_string(), 0.2);

    vec![
        CampaignInput::new(
            "تجارة إلكترونية",
            100_000.0,
            vec!["Sales".to_string(), "Traffic".to_string()],
        )
        .with_platforms(vec![
            "Meta".to_string(),
            "Google Search".to_string(),
            "TikTok".to_string(),
        ]),
        CampaignInput::new("عقارات", 20_000.0, vec!["Awareness".to_string()])
            .with_season("Ramadan")
            .with_device_mix(mix),
        CampaignInput::new(
            "سياحة وسفر",
            300_000.0,
            vec!["Sales".to_string(), "Awareness".to_string(), "Engagement".to_string()],
        )
        .with_season("Summer"),
    ]
}

fn main() {
    let engine = ForecastEngine::builtin(ForecastConfig::default()).expect("Failed to create engine");
    let inputs = sample_inputs();

    // Warmup
    for input in &inputs {
        engine.forecast(input).unwrap();
    }

    // Benchmark
    let iterations = 10_000u32;
    let start = std::time::Instant::now();

    for i in 0..iterations {
        let input = &inputs[i as usize % inputs.len()];
        let _ = engine.forecast(input).unwrap();
    }

    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations;

    println!("=== Forecast Benchmark ===");
    println!("Iterations:  {}", iterations);
    println!("Total time:  {:?}", elapsed);
    println!("Per call:    {:?}", per_iter);
    println!("Throughput:  {:.0} forecasts/sec", iterations as f64 / elapsed.as_secs_f64());
    println!("Inputs:      {}", inputs.len());
}
