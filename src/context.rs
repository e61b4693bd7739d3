use crate::descriptor::Descriptor;
use crate::error::GblasError;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Deferred-work policy selected once per process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Every operation drains its outputs before returning
    Blocking,
    /// Operations may leave pending tuples, zombies, and jumbled order
    NonBlocking,
}

const MODE_UNSET: u8 = 0;
const MODE_BLOCKING: u8 = 1;
const MODE_NONBLOCKING: u8 = 2;

static MODE: AtomicU8 = AtomicU8::new(MODE_UNSET);

/// Select the process-wide mode; a second call fails with AlreadySet
///
/// If `init` is never called the engine lazily assumes non-blocking.
pub fn init(mode: Mode) -> Result<(), GblasError> {
    let val = match mode {
        Mode::Blocking => MODE_BLOCKING,
        Mode::NonBlocking => MODE_NONBLOCKING,
    };
    MODE.compare_exchange(MODE_UNSET, val, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| GblasError::AlreadySet("engine mode".to_string()))
}

pub fn mode() -> Mode {
    match MODE.load(Ordering::SeqCst) {
        MODE_BLOCKING => Mode::Blocking,
        _ => Mode::NonBlocking,
    }
}

/// Process-wide defaults, overridable per context and per descriptor
#[derive(Clone, Copy, Debug)]
pub struct GlobalConfig {
    /// 0 means "let rayon decide"
    pub nthreads: usize,
    /// Smallest problem size for which parallelism is attempted
    pub chunk: usize,
    pub hyper_switch: f64,
    pub bitmap_switch: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            nthreads: 0,
            chunk: 4096,
            hyper_switch: crate::matrix::DEFAULT_HYPER_SWITCH,
            bitmap_switch: crate::matrix::DEFAULT_BITMAP_SWITCH,
        }
    }
}

static GLOBAL: Mutex<Option<GlobalConfig>> = Mutex::new(None);

pub fn global_config() -> GlobalConfig {
    let guard = GLOBAL.lock().unwrap();
    guard.unwrap_or_default()
}

pub fn set_global_config(cfg: GlobalConfig) {
    *GLOBAL.lock().unwrap() = Some(cfg);
}

/// Thread-local override of thread and chunk hints
///
/// Contexts stack: engage pushes, disengage pops the most recent engage on
/// this thread.
#[derive(Clone, Copy, Debug)]
pub struct Context {
    pub nthreads: Option<usize>,
    pub chunk: Option<usize>,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = RefCell::new(Vec::new());
}

impl Context {
    pub fn new() -> Context {
        Context {
            nthreads: None,
            chunk: None,
        }
    }

    pub fn with_nthreads(mut self, n: usize) -> Self {
        self.nthreads = Some(n);
        self
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }

    pub fn engage(self) {
        CONTEXT_STACK.with(|s| s.borrow_mut().push(self));
    }

    pub fn disengage() -> Result<Context, GblasError> {
        CONTEXT_STACK.with(|s| {
            s.borrow_mut()
                .pop()
                .ok_or(GblasError::Uninitialized)
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn engaged() -> Option<Context> {
    CONTEXT_STACK.with(|s| s.borrow().last().copied())
}

/// Worker count for one operation: descriptor > engaged context > global
pub(crate) fn effective_nthreads(desc: &Descriptor) -> usize {
    if let Some(n) = desc.nthreads {
        return n.max(1);
    }
    if let Some(ctx) = engaged() {
        if let Some(n) = ctx.nthreads {
            return n.max(1);
        }
    }
    let n = global_config().nthreads;
    if n == 0 {
        rayon::current_num_threads()
    } else {
        n
    }
}

/// Chunk hint for one operation: descriptor > engaged context > global
pub(crate) fn effective_chunk(desc: &Descriptor) -> usize {
    desc.chunk
        .or_else(|| engaged().and_then(|c| c.chunk))
        .unwrap_or_else(|| global_config().chunk)
        .max(1)
}

/// How many parallel tasks a problem of `work` units should use
pub(crate) fn task_count(work: usize, desc: &Descriptor) -> usize {
    let chunk = effective_chunk(desc);
    if work <= chunk {
        1
    } else {
        effective_nthreads(desc).min(work / chunk).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_stack_overrides_global() {
        let desc = Descriptor::new();
        Context::new().with_nthreads(3).with_chunk(10).engage();
        assert_eq!(effective_nthreads(&desc), 3);
        assert_eq!(effective_chunk(&desc), 10);
        Context::disengage().unwrap();
    }

    #[test]
    fn descriptor_wins_over_context() {
        let mut desc = Descriptor::new();
        desc.nthreads = Some(2);
        Context::new().with_nthreads(7).engage();
        assert_eq!(effective_nthreads(&desc), 2);
        Context::disengage().unwrap();
    }

    #[test]
    fn disengage_without_engage_is_an_error() {
        // runs on its own thread-local stack in this test thread; drain first
        while Context::disengage().is_ok() {}
        assert_eq!(Context::disengage().unwrap_err(), GblasError::Uninitialized);
    }

    #[test]
    fn small_problems_run_serial() {
        let desc = Descriptor::new();
        assert_eq!(task_count(10, &desc), 1);
    }
}
