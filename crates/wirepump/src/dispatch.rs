//! Connection-level dispatch.
//!
//! One [`Connection`] owns the transport, the event queue, and the
//! routing tables. Each time the application's control loop gives it a
//! chance to process input it drains the queue: records are classified
//! as protocol errors or events, superseded high-frequency events are
//! coalesced away, and survivors are routed to the listener registered
//! for their window or to the fixed subsystem handler for their kind.
//! The dispatcher keeps no per-cycle state of its own; everything lives
//! in the queue and the registries.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use wirepump_proto::{
    ClientMessageEvent, ConfigureEvent, CoreInputEvent, DestroyEvent, ErrorRecord, EventRecord,
    ExposeEvent, ExtendedInputEvent, ExtendedKind, FocusEvent, MapEvent, MappingEvent,
    PropertyEvent, RecordKind, SelectionClearEvent, SelectionOwnerEvent, SelectionRequestEvent,
    ServerTime, UnmapEvent, WindowId,
};

use crate::config::PumpConfig;
use crate::error::PumpError;
use crate::listener::{
    InputHandler, KeymapHandler, RecordFilter, SelectionHandler, WindowEventListener,
};
use crate::queue::{DrainMode, EventQueue, WakeupHook};
use crate::transport::{Transport, UnixTransport};

/// A pumping connection to the display server.
///
/// The consumer half of the pump: runs on the application's control
/// loop and never migrates mid-drain, so it is deliberately not
/// thread-shareable (listeners are `Rc`-held by the window layer).
pub struct Connection {
    transport: Arc<dyn Transport>,
    queue: EventQueue,
    listeners: HashMap<WindowId, Rc<dyn WindowEventListener>>,
    filters: Vec<Box<dyn RecordFilter>>,
    selection_handler: Option<Box<dyn SelectionHandler>>,
    keymap_handler: Option<Box<dyn KeymapHandler>>,
    input_handler: Option<Box<dyn InputHandler>>,
    time: ServerTime,
    coalesce: bool,
    wait_timeout: Duration,
}

impl Connection {
    /// Connect to the display server socket named by `config` and start
    /// pumping.
    ///
    /// # Errors
    ///
    /// Returns socket discovery/connect errors from
    /// [`UnixTransport::connect`] and `PumpError::ReaderSpawnFailed` if
    /// the reader thread cannot start.
    pub fn connect(config: &PumpConfig) -> Result<Self, PumpError> {
        let transport = Arc::new(UnixTransport::connect(config)?);
        Self::new(transport, config)
    }

    /// Start pumping over an already-established transport.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ReaderSpawnFailed` if the reader thread
    /// cannot start.
    pub fn new(transport: Arc<dyn Transport>, config: &PumpConfig) -> Result<Self, PumpError> {
        Self::build(transport, config, None)
    }

    /// Like [`new`](Self::new), with a hook the reader invokes after
    /// each enqueue batch so the control loop can schedule a drain.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ReaderSpawnFailed` if the reader thread
    /// cannot start.
    pub fn with_wakeup_hook(
        transport: Arc<dyn Transport>,
        config: &PumpConfig,
        hook: WakeupHook,
    ) -> Result<Self, PumpError> {
        Self::build(transport, config, Some(hook))
    }

    fn build(
        transport: Arc<dyn Transport>,
        config: &PumpConfig,
        hook: Option<WakeupHook>,
    ) -> Result<Self, PumpError> {
        let queue = EventQueue::start(Arc::clone(&transport), hook)?;
        Ok(Self::assemble(transport, queue, config))
    }

    fn assemble(transport: Arc<dyn Transport>, queue: EventQueue, config: &PumpConfig) -> Self {
        Self {
            transport,
            queue,
            listeners: HashMap::new(),
            filters: Vec::new(),
            selection_handler: None,
            keymap_handler: None,
            input_handler: None,
            time: ServerTime::UNSET,
            coalesce: config.coalesce_high_frequency,
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
        }
    }

    /// Connection with a detached queue; tests drive the producer half
    /// directly instead of through a reader thread.
    #[cfg(test)]
    pub(crate) fn detached(
        transport: Arc<dyn Transport>,
        config: &PumpConfig,
    ) -> (Self, crate::queue::Producer) {
        let (queue, producer) = EventQueue::detached();
        (Self::assemble(transport, queue, config), producer)
    }

    /// Register `listener` for events carrying `window`.
    pub fn register_listener(&mut self, window: WindowId, listener: Rc<dyn WindowEventListener>) {
        self.listeners.insert(window, listener);
    }

    pub fn unregister_listener(&mut self, window: WindowId) {
        self.listeners.remove(&window);
    }

    pub fn listener_for(&self, window: WindowId) -> Option<Rc<dyn WindowEventListener>> {
        self.listeners.get(&window).cloned()
    }

    pub fn set_selection_handler(&mut self, handler: Box<dyn SelectionHandler>) {
        self.selection_handler = Some(handler);
    }

    pub fn set_keymap_handler(&mut self, handler: Box<dyn KeymapHandler>) {
        self.keymap_handler = Some(handler);
    }

    pub fn set_input_handler(&mut self, handler: Box<dyn InputHandler>) {
        self.input_handler = Some(handler);
    }

    /// Install a filter that sees every record ahead of dispatch.
    pub fn install_record_filter(&mut self, filter: Box<dyn RecordFilter>) {
        self.filters.push(filter);
    }

    /// Direct access to the pump, for subsystems that peek at pending
    /// records (selection transfers, native filters).
    pub fn queue(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    /// Latest timestamp observed from the server.
    pub fn server_time(&self) -> ServerTime {
        self.time
    }

    /// Fold a timestamp into the authority; stale and unset values are
    /// ignored, with wraparound handled.
    pub fn observe_time(&mut self, time: ServerTime) {
        if time.is_after(self.time) {
            self.time = time;
        }
    }

    /// Block until new records are visible or the timeout (default
    /// from config) elapses.
    pub fn wait_for_new_events(&mut self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.wait_timeout);
        self.queue.wait_for_new_events(timeout)
    }

    /// Flush buffered outbound requests on the transport.
    pub fn flush(&self) {
        self.transport.flush();
    }

    /// Stop the reader thread; pending records stay queued until drop.
    pub fn shutdown(&mut self) {
        self.queue.shutdown();
    }

    /// One drain cycle: deliver every pending record.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ConnectionBroken` when the transport has
    /// failed. There is no recovery path: a severed connection ends
    /// pumping for good, and the caller decides how loudly to die.
    pub fn process_events(&mut self, mode: DrainMode) -> Result<(), PumpError> {
        if self.queue.connection_broken() || self.transport.has_error() {
            return Err(PumpError::ConnectionBroken);
        }

        self.queue.flush_buffered();
        while let Some(record) = self.queue.take_first(mode) {
            if record.is_error() {
                self.handle_error_record(&record);
                continue;
            }
            if self.coalesce && self.compress_record(&record) {
                continue;
            }
            self.dispatch_record(&record);
            // Pick up records that arrived while handlers ran.
            self.queue.flush_buffered();
        }

        self.transport.flush();
        Ok(())
    }

    fn run_filters(&mut self, record: &EventRecord) -> bool {
        self.filters.iter_mut().any(|filter| filter.filter(record))
    }

    fn handle_error_record(&mut self, record: &EventRecord) {
        if self.run_filters(record) {
            return;
        }
        if let Some(error) = ErrorRecord::from_record(record) {
            tracing::warn!(
                "protocol error: {} ({}), sequence: {}, resource id: {}, major code: {} ({}), minor code: {}",
                error.error_name(),
                error.error_code,
                error.sequence,
                error.resource_id,
                error.major_code,
                error.request_name(),
                error.minor_code,
            );
        }
    }

    /// Drop `record` if a same-class record it supersedes is still
    /// pending in the flushed window. Classes are tested in a fixed
    /// order; the first match decides.
    fn compress_record(&mut self, record: &EventRecord) -> bool {
        match record.kind() {
            RecordKind::Motion => self
                .queue
                .peek_match(|next| next.kind() == RecordKind::Motion),
            RecordKind::Extended(ExtendedKind::Motion) => self
                .queue
                .peek_match(|next| next.kind() == RecordKind::Extended(ExtendedKind::Motion)),
            RecordKind::ConfigureNotify => {
                // Only configures for the same window supersede each
                // other.
                let window = record.window();
                self.queue.peek_match(move |next| {
                    next.kind() == RecordKind::ConfigureNotify && next.window() == window
                })
            }
            _ => false,
        }
    }

    fn dispatch_record(&mut self, record: &EventRecord) {
        tracing::trace!(kind = ?record.kind(), sequence = record.sequence(), "dispatching record");

        if self.run_filters(record) {
            return;
        }
        if let Some(time) = record.timestamp() {
            self.observe_time(time);
        }

        match record.kind() {
            RecordKind::Expose => {
                if let Some(event) = ExposeEvent::from_record(record) {
                    self.deliver(event.window, record, |l| l.handle_expose(&event));
                }
            }
            RecordKind::ConfigureNotify => {
                if let Some(event) = ConfigureEvent::from_record(record) {
                    self.deliver(event.event_window, record, |l| l.handle_configure(&event));
                }
            }
            RecordKind::MapNotify => {
                if let Some(event) = MapEvent::from_record(record) {
                    self.deliver(event.event_window, record, |l| l.handle_map(&event));
                }
            }
            RecordKind::UnmapNotify => {
                if let Some(event) = UnmapEvent::from_record(record) {
                    self.deliver(event.event_window, record, |l| l.handle_unmap(&event));
                }
            }
            RecordKind::DestroyNotify => {
                if let Some(event) = DestroyEvent::from_record(record) {
                    self.deliver(event.event_window, record, |l| l.handle_destroy(&event));
                }
            }
            RecordKind::ClientMessage => {
                if let Some(event) = ClientMessageEvent::from_record(record) {
                    if event.format != 32 {
                        return;
                    }
                    self.deliver(event.window, record, |l| l.handle_client_message(&event));
                }
            }
            RecordKind::FocusIn => {
                if let Some(event) = FocusEvent::from_record(record) {
                    self.deliver(event.window, record, |l| l.handle_focus_in(&event));
                }
            }
            RecordKind::FocusOut => {
                if let Some(event) = FocusEvent::from_record(record) {
                    self.deliver(event.window, record, |l| l.handle_focus_out(&event));
                }
            }
            RecordKind::PropertyNotify => {
                if let Some(event) = PropertyEvent::from_record(record) {
                    if let Some(handler) = &mut self.selection_handler {
                        if handler.handle_property_notify(&event) {
                            return;
                        }
                    }
                    self.deliver(event.window, record, |l| l.handle_property(&event));
                }
            }
            RecordKind::SelectionRequest => {
                if let Some(event) = SelectionRequestEvent::from_record(record) {
                    if let Some(handler) = &mut self.selection_handler {
                        handler.handle_selection_request(&event);
                    }
                }
            }
            RecordKind::SelectionClear => {
                if let Some(event) = SelectionClearEvent::from_record(record) {
                    if let Some(handler) = &mut self.selection_handler {
                        handler.handle_selection_clear(&event);
                    }
                }
            }
            RecordKind::SelectionNotify => {
                // Timestamp already folded in; selection transfers pick
                // these up through the peek interface.
            }
            RecordKind::SelectionOwnerNotify => {
                if let Some(event) = SelectionOwnerEvent::from_record(record) {
                    if let Some(handler) = &mut self.selection_handler {
                        handler.handle_owner_change(&event);
                    }
                }
            }
            RecordKind::MappingNotify => {
                if let Some(event) = MappingEvent::from_record(record) {
                    if let Some(handler) = &mut self.keymap_handler {
                        handler.handle_mapping_change(&event);
                    }
                }
            }
            RecordKind::KeymapNotify => {
                if let Some(handler) = &mut self.keymap_handler {
                    handler.handle_keymap_state(record);
                }
            }
            RecordKind::KeyPress
            | RecordKind::KeyRelease
            | RecordKind::ButtonPress
            | RecordKind::ButtonRelease
            | RecordKind::Motion
            | RecordKind::Enter
            | RecordKind::Leave => {
                if let Some(event) = CoreInputEvent::from_record(record) {
                    if let Some(handler) = &mut self.input_handler {
                        handler.handle_core_input(&event);
                    }
                }
            }
            RecordKind::Extended(ExtendedKind::Enter) | RecordKind::Extended(ExtendedKind::Leave) => {
                if let Some(event) = ExtendedInputEvent::from_record(record) {
                    self.deliver(event.window, record, |l| l.handle_enter_leave(&event));
                }
            }
            RecordKind::Extended(_) => {
                if let Some(event) = ExtendedInputEvent::from_record(record) {
                    if let Some(handler) = &mut self.input_handler {
                        handler.handle_extended_input(&event);
                    }
                }
            }
            RecordKind::Error => {
                // Classified before dispatch; unreachable in practice.
            }
            RecordKind::Unknown(tag) => {
                tracing::debug!(tag, "unhandled record tag");
            }
        }
    }

    fn deliver<F>(&mut self, window: WindowId, record: &EventRecord, invoke: F)
    where
        F: FnOnce(&dyn WindowEventListener),
    {
        let Some(listener) = self.listeners.get(&window).cloned() else {
            tracing::trace!(window, "no listener registered for window");
            return;
        };
        if listener.handle_native(record) {
            return;
        }
        invoke(listener.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use wirepump_proto::records;

    /// Transport that never produces anything; dispatch tests feed the
    /// queue through a detached producer instead.
    struct IdleTransport {
        failed: bool,
    }

    impl Transport for IdleTransport {
        fn wait_for_record(&self) -> Result<EventRecord, PumpError> {
            Err(PumpError::ConnectionClosed)
        }

        fn poll_for_queued_record(&self) -> Result<Option<EventRecord>, PumpError> {
            Ok(None)
        }

        fn has_error(&self) -> bool {
            self.failed
        }

        fn interrupt(&self) {}
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn connection() -> (Connection, crate::queue::Producer, Log) {
        let transport = Arc::new(IdleTransport { failed: false });
        let (mut conn, producer) = Connection::detached(transport, &PumpConfig::default());
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        conn.set_input_handler(Box::new(RecordingInput { log: Rc::clone(&log) }));
        (conn, producer, log)
    }

    struct RecordingListener {
        log: Log,
    }

    impl WindowEventListener for RecordingListener {
        fn handle_expose(&self, event: &ExposeEvent) {
            self.log
                .borrow_mut()
                .push(format!("expose {}x{}+{}+{}", event.width, event.height, event.x, event.y));
        }

        fn handle_configure(&self, event: &ConfigureEvent) {
            self.log
                .borrow_mut()
                .push(format!("configure {}x{}", event.width, event.height));
        }

        fn handle_property(&self, event: &PropertyEvent) {
            self.log.borrow_mut().push(format!("property {}", event.atom));
        }

        fn handle_client_message(&self, event: &ClientMessageEvent) {
            self.log
                .borrow_mut()
                .push(format!("client_message {}", event.message_type));
        }

        fn handle_enter_leave(&self, event: &ExtendedInputEvent) {
            self.log.borrow_mut().push(format!("enter_leave {:?}", event.kind));
        }
    }

    struct RecordingInput {
        log: Log,
    }

    impl InputHandler for RecordingInput {
        fn handle_core_input(&mut self, event: &CoreInputEvent) {
            self.log.borrow_mut().push(format!("input {:?}", event.kind));
        }

        fn handle_extended_input(&mut self, event: &ExtendedInputEvent) {
            self.log.borrow_mut().push(format!("xinput {:?}", event.kind));
        }
    }

    fn register_recording_listener(conn: &mut Connection, window: WindowId, log: &Log) {
        conn.register_listener(window, Rc::new(RecordingListener { log: Rc::clone(log) }));
    }

    #[test]
    fn superseded_high_frequency_records_are_dropped() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);

        producer.enqueue(records::motion(1, 0, 0, 1));
        producer.enqueue(records::motion(1, 5, 5, 2));
        producer.enqueue(records::configure(1, 1, 0, 0, 10, 10));
        producer.enqueue(records::configure(1, 1, 0, 0, 20, 20));
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(
            *log.borrow(),
            vec!["input Motion", "configure 20x20", "expose 8x8+0+0"]
        );
    }

    #[test]
    fn coalescing_respects_window_identity() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);
        register_recording_listener(&mut conn, 2, &log);

        // Different windows: both configures survive.
        producer.enqueue(records::configure(1, 1, 0, 0, 10, 10));
        producer.enqueue(records::configure(2, 2, 0, 0, 20, 20));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["configure 10x10", "configure 20x20"]);
    }

    #[test]
    fn coalescing_can_be_disabled() {
        let transport = Arc::new(IdleTransport { failed: false });
        let config = PumpConfig {
            coalesce_high_frequency: false,
            ..PumpConfig::default()
        };
        let (mut conn, mut producer) = Connection::detached(transport, &config);
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        conn.set_input_handler(Box::new(RecordingInput { log: Rc::clone(&log) }));

        producer.enqueue(records::motion(1, 0, 0, 1));
        producer.enqueue(records::motion(1, 5, 5, 2));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["input Motion", "input Motion"]);
    }

    #[test]
    fn records_route_to_the_registered_window() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 7, &log);

        producer.enqueue(records::expose(7, 1, 2, 30, 40, 0));
        producer.enqueue(records::expose(8, 0, 0, 9, 9, 0)); // no listener

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["expose 30x40+1+2"]);
    }

    #[test]
    fn protocol_errors_never_reach_listeners() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);

        producer.enqueue(records::error(3, 9, 1, 12, 0));
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["expose 8x8+0+0"]);
    }

    #[test]
    fn filters_swallow_records_before_dispatch() {
        struct DropExpose;
        impl RecordFilter for DropExpose {
            fn filter(&mut self, record: &EventRecord) -> bool {
                record.kind() == RecordKind::Expose
            }
        }

        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);
        conn.install_record_filter(Box::new(DropExpose));

        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        producer.enqueue(records::property_notify(1, 55, 1, 0));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["property 55"]);
    }

    #[test]
    fn timestamps_advance_monotonically() {
        let (mut conn, mut producer, _log) = connection();

        producer.enqueue(records::property_notify(1, 1, 100, 0));
        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(conn.server_time(), ServerTime::new(100));

        // Older timestamp: ignored.
        producer.enqueue(records::property_notify(1, 1, 50, 0));
        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(conn.server_time(), ServerTime::new(100));
    }

    #[test]
    fn timestamp_ordering_survives_wraparound() {
        let (mut conn, mut producer, _log) = connection();

        producer.enqueue(records::property_notify(1, 1, u32::MAX - 5, 0));
        producer.enqueue(records::property_notify(1, 1, 3, 0));
        conn.process_events(DrainMode::All).expect("drain");
        // The small value sits just past the wrap and still counts as
        // newer.
        assert_eq!(conn.server_time(), ServerTime::new(3));
    }

    #[test]
    fn excluded_input_arrives_on_the_next_full_drain() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);

        producer.enqueue(records::motion(1, 0, 0, 1));
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));

        conn.process_events(DrainMode::ExcludeUserInput).expect("drain");
        assert_eq!(*log.borrow(), vec!["expose 8x8+0+0"]);

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["expose 8x8+0+0", "input Motion"]);
    }

    #[test]
    fn client_messages_require_the_full_word_format() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 4, &log);

        producer.enqueue(records::client_message(4, 77, 8, [0; 20]));
        producer.enqueue(records::client_message(4, 78, 32, [0; 20]));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["client_message 78"]);
    }

    #[test]
    fn selection_handler_gets_first_refusal_on_properties() {
        struct ClaimAtom {
            atom: u32,
            log: Log,
        }
        impl SelectionHandler for ClaimAtom {
            fn handle_property_notify(&mut self, event: &PropertyEvent) -> bool {
                if event.atom == self.atom {
                    self.log.borrow_mut().push(format!("claimed {}", event.atom));
                    return true;
                }
                false
            }
            fn handle_selection_request(&mut self, event: &SelectionRequestEvent) {
                self.log
                    .borrow_mut()
                    .push(format!("request {}", event.selection));
            }
        }

        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 1, &log);
        conn.set_selection_handler(Box::new(ClaimAtom {
            atom: 90,
            log: Rc::clone(&log),
        }));

        producer.enqueue(records::property_notify(1, 90, 1, 0));
        producer.enqueue(records::property_notify(1, 91, 2, 0));
        producer.enqueue(records::selection_request(1, 2, 3, 4, 5, 6));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(
            *log.borrow(),
            vec!["claimed 90", "property 91", "request 3"]
        );
    }

    #[test]
    fn keymap_changes_route_to_the_keymap_handler() {
        struct RecordingKeymap {
            log: Log,
        }
        impl KeymapHandler for RecordingKeymap {
            fn handle_mapping_change(&mut self, event: &MappingEvent) {
                self.log
                    .borrow_mut()
                    .push(format!("mapping {:?}", event.request));
            }
            fn handle_keymap_state(&mut self, _record: &EventRecord) {
                self.log.borrow_mut().push("keymap state".into());
            }
        }

        let (mut conn, mut producer, log) = connection();
        conn.set_keymap_handler(Box::new(RecordingKeymap { log: Rc::clone(&log) }));

        producer.enqueue(records::mapping_notify(
            wirepump_proto::MappingRequest::Keyboard,
            8,
            240,
        ));
        producer.enqueue(records::keymap_notify(&[0xff; 4]));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["mapping Keyboard", "keymap state"]);
    }

    #[test]
    fn extended_enter_leave_reaches_the_window_listener() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 6, &log);

        producer.enqueue(records::extended(wirepump_proto::xi::ENTER, 6, 0, 10));
        producer.enqueue(records::extended(wirepump_proto::xi::MOTION, 6, 0, 11));

        conn.process_events(DrainMode::All).expect("drain");
        assert_eq!(*log.borrow(), vec!["enter_leave Enter", "xinput Motion"]);
    }

    #[test]
    fn a_failed_transport_stops_the_drain() {
        let transport = Arc::new(IdleTransport { failed: true });
        let (mut conn, _producer) = Connection::detached(transport, &PumpConfig::default());
        assert!(matches!(
            conn.process_events(DrainMode::All),
            Err(PumpError::ConnectionBroken)
        ));
    }

    #[test]
    fn listeners_unregister_cleanly() {
        let (mut conn, mut producer, log) = connection();
        register_recording_listener(&mut conn, 5, &log);
        assert!(conn.listener_for(5).is_some());

        conn.unregister_listener(5);
        assert!(conn.listener_for(5).is_none());

        producer.enqueue(records::expose(5, 0, 0, 8, 8, 0));
        conn.process_events(DrainMode::All).expect("drain");
        assert!(log.borrow().is_empty());
    }
}
