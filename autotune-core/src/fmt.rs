#![macro_use]
#![allow(unused_macros)]

// Each level forwards to `log` when enabled, else to `defmt`. With neither
// backend the arguments are still referenced so callers build warning free.
macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);

            #[cfg(all(feature = "defmt", not(feature = "log")))]
            ::defmt::$level!($s $(, $x)*);

            #[cfg(not(any(feature = "log", feature = "defmt")))]
            {
                $(let _ = &$x;)*
            }
        }
    };
}

macro_rules! log_trace {
    ($($args:tt)*) => {
        log_at!(trace, $($args)*)
    };
}

macro_rules! log_debug {
    ($($args:tt)*) => {
        log_at!(debug, $($args)*)
    };
}

macro_rules! log_info {
    ($($args:tt)*) => {
        log_at!(info, $($args)*)
    };
}

macro_rules! log_warn {
    ($($args:tt)*) => {
        log_at!(warn, $($args)*)
    };
}
