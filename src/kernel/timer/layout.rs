//! 具名定时器布局

/// 声明一组具名定时器
///
/// 为每个条目生成 `<NAME>_TIMER` 常量，并生成返回 [`TimerSpec`](crate::kernel::timer::TimerSpec)
/// 列表的 `<layout>_specs()` 函数，常量顺序与列表顺序一致。
///
/// # 示例
///
/// ```rust
/// use neon_sim::timer_layout;
///
/// timer_layout! {
///     pub Printer {
///         STEP => ("Step ISR", 1),
///         HEATER => ("Heater ISR", 8),
///     }
/// }
///
/// assert_eq!(STEP_TIMER.index(), 0);
/// assert_eq!(HEATER_TIMER.index(), 1);
/// assert_eq!(printer_specs()[1].name, "Heater ISR");
/// ```
#[macro_export]
macro_rules! timer_layout {
    (
        $vis:vis $layout:ident {
            $($name:ident => ($label:expr, $priority:expr)),* $(,)?
        }
    ) => {
        $crate::paste::paste! {
            #[allow(non_camel_case_types, dead_code)]
            #[repr(usize)]
            enum [<$layout TimerIndex>] {
                $($name),*
            }

            $(
                $vis const [<$name _TIMER>]: $crate::kernel::timer::TimerId =
                    $crate::kernel::timer::TimerId::new([<$layout TimerIndex>]::$name as usize);
            )*

            $vis fn [<$layout:snake _specs>]() -> ::std::vec::Vec<$crate::kernel::timer::TimerSpec> {
                ::std::vec![
                    $($crate::kernel::timer::TimerSpec::new($label, $priority)),*
                ]
            }
        }
    };
}

crate::timer_layout! {
    pub DefaultLayout {
        STEPPER => ("Stepper ISR", 1),
        TEMPERATURE => ("Temperature ISR", 10),
        SYSTICK => ("SysTick", 5),
        FIRMWARE_LOOP => ("Firmware Loop", 100),
    }
}
