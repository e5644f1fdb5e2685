//! Console output.
//!
//! On bare metal everything goes out the first serial port. Hosted builds
//! (unit tests, simulators) forward to the process's stdout/stderr so test
//! output stays readable.

use core::fmt;

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
    {
        use core::fmt::Write;
        // SAFETY: The serial writer is only touched with interrupts disabled
        // or from a single core during bring-up.
        unsafe {
            let _ = (*core::ptr::addr_of_mut!(crate::serial::SERIAL_WRITER)).write_fmt(args);
        }
    }
    #[cfg(not(target_os = "none"))]
    std::print!("{args}");
    #[cfg(all(target_os = "none", not(any(target_arch = "x86", target_arch = "x86_64"))))]
    let _ = args;
}

#[doc(hidden)]
pub fn _eprint(args: fmt::Arguments) {
    #[cfg(not(target_os = "none"))]
    std::eprint!("{args}");
    #[cfg(target_os = "none")]
    _print(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::macros::_print(format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! println {
    () => {{
        $crate::macros::_print(format_args!("\n"));
    }};
    ($($arg:tt)*) => {{
        $crate::macros::_print(format_args!("{}\n", format_args!($($arg)*)));
    }};
}

#[macro_export]
macro_rules! eprint {
    ($($arg:tt)*) => {{
        $crate::macros::_eprint(format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! eprintln {
    () => {{
        $crate::macros::_eprint(format_args!("\n"));
    }};
    ($($arg:tt)*) => {{
        $crate::macros::_eprint(format_args!("{}\n", format_args!($($arg)*)));
    }};
}
