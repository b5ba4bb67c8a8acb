//! Record macros
//!
//! Each macro builds a [`LogRecord`](crate::LogRecord) stamped with the call
//! site and returns the future from [`Logger::log`](crate::Logger::log):
//!
//! ```rust,ignore
//! logvault::info!(logger, "connected to {}", host).await;
//! logvault::error!(logger, category: "Net", "timeout after {:?}", elapsed).await;
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __log_record {
    ($logger:expr, $severity:expr, category: $category:expr, $($arg:tt)+) => {
        $logger.log($crate::LogRecord::new(
            $severity,
            ::std::format!($($arg)+),
            $category,
            $crate::call_site!(),
        ))
    };
    ($logger:expr, $severity:expr, $($arg:tt)+) => {
        $logger.log($crate::LogRecord::new(
            $severity,
            ::std::format!($($arg)+),
            $crate::DEFAULT_CATEGORY,
            $crate::call_site!(),
        ))
    };
}

#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Trace, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Warning, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log_record!($logger, $crate::Severity::Fatal, $($arg)+)
    };
}
