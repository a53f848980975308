#![macro_use]
#![allow(unused)]

// Forward to defmt at `$level`. Without defmt the arguments are only borrowed
// so call sites compile the same either way.
#[allow(unused_macros)]
#[collapse_debuginfo(yes)]
macro_rules! radio_log {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt::$level!($s $(, $x)*);
        #[cfg(not(feature = "defmt-03"))]
        let _ = ($( & $x ),*);
    }};
}

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => { radio_log!(trace, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => { radio_log!(debug, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => { radio_log!(info, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => { radio_log!(warn, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => { radio_log!(error, $($arg)*) };
}
