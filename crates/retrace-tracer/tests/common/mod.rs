mod backend;
mod handler;

use retrace_tracer::backend::{Symbol, SymbolKind};
use retrace_tracer::tracer::{Builder, Ready, Tracer};

pub use self::backend::{
    Call, DEFAULT_EXE, MockBackend, MockController, SIGSTOP, SYS_EXECVE, SYS_FORK, SYS_WRITE,
};
pub use self::handler::{Record, RecordingHandler};

pub const FOO: u64 = 0x1030;
pub const BAR: u64 = 0x1040;

/// Creates a tracer builder over a mock backend whose default image has two
/// library functions, `foo` and `bar`.
pub fn builder() -> (
    Builder<Ready<MockBackend, RecordingHandler>>,
    MockController,
) {
    let backend = MockBackend::new();
    let mock = backend.controller();

    mock.set_image(
        DEFAULT_EXE,
        vec![
            Symbol::new("foo", FOO, SymbolKind::Plt),
            Symbol::new("bar", BAR, SymbolKind::Plt),
            Symbol::new("main", 0x1140, SymbolKind::Local),
        ],
    );

    let builder = Tracer::builder()
        .with_backend(backend)
        .with_event_handler(RecordingHandler::default());

    (builder, mock)
}
