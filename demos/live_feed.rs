//! Live feed example: one producer thread, one ticking consumer
//!
//! Run with: cargo run --example live_feed [SECONDS]
//!
//! A synthetic source pushes a sine wave at 60Hz from its own thread while the
//! consumer ticks at 30Hz and evaluates the subject against its own clock.
//! Set RUST_LOG=linkhub=trace to watch the ingestion path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use linkhub::subject::{PropertyRenameRemapper, RoleDefaults};
use linkhub::{
    Client, ClientConfig, ClientHandle, EvaluationMode, FrameData, Role, Source, SourceId,
    SourceSettings, StaticData, SubjectKey,
};

const PRODUCER_RATE: f64 = 60.0;
const TICK_RATE: f64 = 30.0;

/// Pushes `sin(t)` and `cos(t)` for a single subject
struct SineSource {
    running: Arc<AtomicBool>,
    started: Instant,
}

impl SineSource {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            started: Instant::now(),
        }
    }
}

impl Source for SineSource {
    fn receive_client(&self, client: ClientHandle, source_id: SourceId) {
        let running = Arc::clone(&self.running);
        let started = self.started;

        thread::spawn(move || {
            let key = SubjectKey::new(source_id, "Wave");
            client.push_subject_static_data(
                key.clone(),
                Role::basic(),
                StaticData::with_properties(["sin", "cos"]),
            );

            let period = Duration::from_secs_f64(1.0 / PRODUCER_RATE);
            while running.load(Ordering::Relaxed) && client.is_connected() {
                let t = started.elapsed().as_secs_f64();
                client.push_subject_frame_data(
                    key.clone(),
                    FrameData::new(t).with_properties(vec![t.sin() as f32, t.cos() as f32]),
                );
                thread::sleep(period);
            }
        });
    }

    fn initialize_settings(&self, settings: &mut SourceSettings) {
        settings.mode = EvaluationMode::EngineTime;
    }

    fn is_source_still_valid(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn request_source_shutdown(&self) -> bool {
        self.running.store(false, Ordering::Relaxed);
        true
    }

    fn source_type(&self) -> String {
        "sine".into()
    }

    fn source_status(&self) -> String {
        format!("{:.1}s", self.started.elapsed().as_secs_f64())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seconds: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 3,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkhub=info".parse()?)
                .add_directive("live_feed=debug".parse()?),
        )
        .init();

    let client = Arc::new(Client::new(ClientConfig::from_env()));

    // Print lifecycle events as they happen
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if !matches!(event, linkhub::ClientEvent::Ticked { .. }) {
                println!("event: {:?}", event);
            }
        }
    });

    // Downstream consumers expect x/y instead of cos/sin
    let remapper = PropertyRenameRemapper::new().rename("sin", "y").rename("cos", "x");
    client.register_role_defaults(
        &Role::basic(),
        RoleDefaults {
            remapper: Some(Arc::new(remapper)),
            ..RoleDefaults::default()
        },
    );

    let id = client.add_source(Arc::new(SineSource::new()))?;
    println!("Source {} added", id);

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / TICK_RATE));
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while Instant::now() < deadline {
        ticker.tick().await;
        client.tick();

        let key = SubjectKey::new(id, "Wave");
        if let Some(data) = client.evaluate_frame("Wave", &Role::basic()) {
            println!(
                "t={:.3} {:?} = {:?} ({})",
                data.frame.world_time.source_time(),
                data.static_data.property_names,
                data.frame.property_values,
                client.subject_state(&key),
            );
        }
    }

    println!("Stats: {:?}", client.stats());
    let clean = client.shutdown();
    println!("Shutdown clean: {}", clean);
    Ok(())
}
