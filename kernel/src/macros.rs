/// Per-event trace of the virtual-memory subsystem, printed only when the `trace_vm` feature
/// is enabled. Arguments are still type-checked when it is not.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if cfg!(feature = "trace_vm") {
            ::pager_shared::println!("[vm] {}", format_args!($($arg)*));
        }
    };
}
