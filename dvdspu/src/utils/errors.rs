#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("Declared SPU size {0} is smaller than its own header")]
    RuntPacket(usize),

    #[error("Insufficient buffered data for SPU packet")]
    InsufficientData,
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Declared SPU size {0} cannot hold the packet header")]
    DeclaredSizeTooSmall(usize),

    #[error("Command sequence header at {0:#06X} overruns the packet")]
    CommandSequenceOverflow(usize),

    #[error("Next sequence offset out of range: {next:#06X}, packet size {size:#06X}")]
    NextSequenceOverflow { next: usize, size: usize },

    #[error("Command {cmd:#04X} operands at {offset:#06X} overrun the packet")]
    CommandOverflow { cmd: u8, offset: usize },

    #[error("Unknown command {0:#04X} with no resynchronization point")]
    UnrecoverableCommand(u8),

    #[error("Sequence index mismatch: next {next:#06X}, current {current:#06X}")]
    SequenceIndexMismatch { next: usize, current: usize },

    #[error("Scanned past the declared packet end: {index:#06X} > {size:#06X}")]
    ScanPastEnd { index: usize, size: usize },

    #[error("Invalid RLE field offsets ({0:#06X}, {1:#06X})")]
    InvalidRleOffsets(i64, i64),

    #[error("No start display command in packet")]
    MissingStartDisplay,

    #[error("{0} bytes of trailing padding after the last command sequence")]
    ExcessPadding(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum RleError {
    #[error("Out of bounds reading RLE data: nibble {cursor} of {limit}")]
    CursorOutOfBounds { cursor: usize, limit: usize },

    #[error("RLE run of {run} at ({x}, {y}) exceeds the {width}x{height} bitmap")]
    PixelOverflow {
        run: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("RLE data ran out {missing} rows before the bottom of the bitmap")]
    RowShortfall { missing: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum OcrError {
    #[error("Recognizer unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Recognition timed out after {0} ms")]
    Timeout(u64),
}

#[derive(thiserror::Error, Debug)]
pub enum FilterLoadError {
    #[error("Malformed filter record: {0:?}")]
    BadRecord(String),

    #[error("Invalid subtitle time: {0:?}")]
    BadTime(String),

    #[error("Unknown filter action: {0:?}")]
    BadAction(String),
}
