use std::env;
use std::process;

use rand::rngs::StdRng;
use rand::SeedableRng;

use rustywwv::simulation::{add_noise, SignalBuilder};
use rustywwv::{Pipeline, PipelineConfig, PipelineEvent};

/// Synthesize a WWV-style broadcast and run the detection pipeline over it.
///
/// Usage: rustywwv [seconds] [noise_sigma]
///
/// Defaults: 150 seconds (enough for two minute markers and a lock) with
/// light channel noise.
fn main() {
    rustywwv::tracing_init::init_tracing();

    let args: Vec<String> = env::args().collect();
    let seconds: u64 = args.get(1).map(|s| s.parse().unwrap_or(150)).unwrap_or(150);
    let noise_sigma: f32 = args.get(2).map(|s| s.parse().unwrap_or(0.05)).unwrap_or(0.05);

    let config = PipelineConfig::default();
    let mut pipeline = match Pipeline::new(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let mut rng = StdRng::seed_from_u64(1);
    println!(
        "Simulating {} s of broadcast at {} Hz raw rate (noise sigma {})",
        seconds, config.raw_sample_rate, noise_sigma
    );

    for sec in 0..seconds {
        let mut builder = SignalBuilder::new(config.raw_sample_rate);
        // Seconds :59 carry the minute marker; every other second a tick.
        if sec % 60 == 59 {
            builder.marker_second(config.target_tone_hz, 1.0);
        } else {
            builder.tick_second(config.target_tone_hz, 1.0);
        }
        // Reference subcarrier under the whole second.
        builder.mix_tone(config.subcarrier_hz[0], 1000.0, 0.15);
        let mut block = builder.into_samples();
        add_noise(&mut block, noise_sigma, &mut rng);

        for event in pipeline.process_block(&block, false) {
            print_event(&event);
        }
    }

    let telemetry = pipeline.telemetry();
    println!("\n=== Final telemetry ===");
    println!("Sync state:        {:?}", telemetry.sync_state);
    println!("Last confirmed:    {:?} ms", telemetry.last_confirmed_ms);
    println!("Marker confidence: {:?}", telemetry.marker_confidence);
    println!(
        "Current chain:     #{} with {} ticks, drift {:.1} ms",
        telemetry.current_chain.chain_id,
        telemetry.current_chain.tick_count,
        telemetry.current_chain.total_drift_ms
    );
    println!(
        "Subcarrier {} Hz:  measured {:.3} Hz ({:+.2} ppm, {:.1} dB SNR, valid={})",
        config.subcarrier_hz[0],
        telemetry.subcarriers[0].measured_hz,
        telemetry.subcarriers[0].offset_ppm,
        telemetry.subcarriers[0].snr_db,
        telemetry.subcarriers[0].valid
    );
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Tick(t) => {
            println!(
                "[{:9.1} ms] TICK #{:<4} int={:6.0} ms chain={} pos={} drift={:+.1} ms",
                t.tick.timestamp_ms,
                t.tick.seq,
                t.tick.interval_ms,
                t.chain_id,
                t.chain_pos,
                t.drift_ms
            );
        }
        PipelineEvent::MinutePulse(p) => {
            println!(
                "[{:9.1} ms] MINUTE PULSE ({:?}) dur={:.0} ms metric={:.1}",
                p.timestamp_ms, p.source, p.duration_ms, p.metric
            );
        }
        PipelineEvent::Marker(m) => {
            println!(
                "[{:9.1} ms] MARKER VERDICT {:?} dur={:.0} ms snr={:.1} dB",
                m.timestamp_ms, m.confidence, m.duration_ms, m.slow_snr_db
            );
        }
        PipelineEvent::Sync(s) => {
            println!(
                "[{:9.1} ms] SYNC {} ({:?}) interval={:?} state={:?}",
                s.timestamp_ms,
                if s.accepted { "CONFIRMED" } else { "REJECTED" },
                s.source,
                s.interval_ms,
                s.state
            );
        }
        // One slow frame every ~85 ms is noise at the console.
        PipelineEvent::SlowMarker(_) => {}
    }
}
