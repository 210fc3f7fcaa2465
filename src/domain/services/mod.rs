//! 各儀表板頁面的指標計算，皆為純函式，不做任何 I/O

pub mod ads;
pub mod attribution;
pub mod email;
pub mod funnel;
pub mod peaks;
pub mod report;
pub mod sales;
pub mod traffic;
