//! Minimal pump demo: a mock display server on one end of a
//! socketpair, the pump on the other.
//!
//! Run with `cargo run --example pump_demo`; set `RUST_LOG=debug` to
//! watch the reader thread work.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use wirepump::{Connection, DrainMode, InputHandler, PumpConfig, UnixTransport, WindowEventListener};
use wirepump_proto::{records, ConfigureEvent, CoreInputEvent, ExposeEvent, RecordKind};

struct DemoWindow;

impl WindowEventListener for DemoWindow {
    fn handle_expose(&self, event: &ExposeEvent) {
        tracing::info!(
            window = event.window,
            width = event.width,
            height = event.height,
            "expose"
        );
    }

    fn handle_configure(&self, event: &ConfigureEvent) {
        tracing::info!(
            window = event.window,
            width = event.width,
            height = event.height,
            "configure"
        );
    }
}

struct DemoInput;

impl InputHandler for DemoInput {
    fn handle_core_input(&mut self, event: &CoreInputEvent) {
        tracing::info!(kind = ?event.kind, x = event.x, y = event.y, "input");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (client, mut server) = UnixStream::pair()?;

    // Mock server: a burst of motion, a resize, then the repaint. The
    // server end stays open until the drain is done.
    for step in 0..3i16 {
        server.write_all(records::motion(7, step * 10, step * 10, (step + 1) as u32).as_bytes())?;
    }
    server.write_all(records::configure(7, 7, 0, 0, 640, 480).as_bytes())?;
    server.write_all(records::expose(7, 0, 0, 640, 480, 0).as_bytes())?;

    let transport = Arc::new(UnixTransport::from_stream(client)?);
    let mut conn = Connection::new(transport, &PumpConfig::default())?;
    conn.register_listener(7, Rc::new(DemoWindow));
    conn.set_input_handler(Box::new(DemoInput));

    // Pump until the trailing expose is visible, then drain once.
    for _ in 0..100 {
        if conn.queue().peek_match(|r| r.kind() == RecordKind::Expose) {
            break;
        }
        conn.wait_for_new_events(Some(Duration::from_millis(50)));
    }
    conn.process_events(DrainMode::All)?;

    tracing::info!(heap_nodes = conn.queue().heap_nodes(), "demo complete");
    drop(server);
    Ok(())
}
