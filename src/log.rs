//! Developer diagnostics for the supervisor loop.
//!
//! Only implementor-facing diagnostics live here — an auth trail and
//! user-facing messages are a policy plugin's concern, not the supervisor's.
//! A host application installs its own [`log::Log`] backend; this crate
//! never calls `log::set_boxed_logger` itself.

macro_rules! dev_logger_macro {
    ($name:ident is $rule_level:ident, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => {
                if std::cfg!(feature = "dev") {
                    ::log::log!(
                        target: "nopty_supervisor::dev",
                        ::log::Level::$rule_level,
                        "{}: {}",
                        std::panic::Location::caller(),
                        format_args!($d($d arg)+)
                    );
                }
            };
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident) => {
        dev_logger_macro!($name is $rule_level, $);
    };
}

dev_logger_macro!(dev_error is Error);
dev_logger_macro!(dev_warn is Warn);
dev_logger_macro!(dev_info is Info);
dev_logger_macro!(dev_debug is Debug);
