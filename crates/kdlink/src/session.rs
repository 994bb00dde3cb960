use std::sync::Mutex;

/// Placeholder core id while the debuggee executes: there is no
/// stopped core to inspect.
pub const NO_CORE: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Unconnected,
    Debugger,
    Debuggee,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    None,
    Serial,
    NamedPipe,
}

#[derive(Debug, Default)]
struct Inner {
    role: Role,
    link: LinkKind,
    running: bool,
    current_core: u32,
    closed: bool,
    modules_loaded: bool,
}

/// Process-wide state of the connection, one record behind one mutex.
///
/// Components receive an `Arc<SessionState>` handle instead of
/// reaching into globals. Invariant: while `running` is true the
/// current core is [`NO_CORE`]; `mark_running`/`mark_paused` keep the
/// two fields in step.
#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { current_core: NO_CORE, ..Inner::default() }) }
    }

    pub fn role(&self) -> Role {
        self.inner.lock().unwrap().role
    }

    pub fn set_role(&self, role: Role) {
        self.inner.lock().unwrap().role = role;
    }

    pub fn link(&self) -> LinkKind {
        self.inner.lock().unwrap().link
    }

    pub fn set_link(&self, link: LinkKind) {
        self.inner.lock().unwrap().link = link;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    /// The debuggee resumed; a running debuggee has no stopped core.
    pub fn mark_running(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.running = true;
        inner.current_core = NO_CORE;
    }

    /// The debuggee halted on `core`.
    pub fn mark_paused(&self, core: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.running = false;
        inner.current_core = core;
    }

    pub fn current_core(&self) -> u32 {
        self.inner.lock().unwrap().current_core
    }

    pub fn clear_core(&self) {
        self.inner.lock().unwrap().current_core = NO_CORE;
    }

    pub fn modules_loaded(&self) -> bool {
        self.inner.lock().unwrap().modules_loaded
    }

    pub fn set_modules_loaded(&self, loaded: bool) {
        self.inner.lock().unwrap().modules_loaded = loaded;
    }

    /// Raises the teardown latch. True only for the caller that starts
    /// the close; everyone else sees the latch already down and must
    /// not repeat teardown work.
    pub fn begin_close(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            false
        } else {
            inner.closed = true;
            true
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Lowers the latch at bring-up so the new session can run.
    pub fn mark_open(&self) {
        self.inner.lock().unwrap().closed = false;
    }

    /// Back to the unconnected state. The teardown latch stays as it
    /// is: in-flight operations keep failing fast until the next
    /// bring-up lowers it.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.role = Role::Unconnected;
        inner.link = LinkKind::None;
        inner.running = false;
        inner.current_core = NO_CORE;
        inner.modules_loaded = false;
    }
}
