macro_rules! emit {
    ($context:expr) => {
        $context.blank()
    };

    ($context:expr, $($format:tt)*) => {
        $context.line(format_args!($($format)*))
    };
}
