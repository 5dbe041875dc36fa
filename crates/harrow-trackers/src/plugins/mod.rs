//! Per-tracker API plugins.

mod bhd;
mod btn;
mod hdb;
mod ops;
mod ptp;
mod red;
mod unit3d;

pub(crate) use bhd::Bhd;
pub(crate) use btn::Btn;
pub(crate) use hdb::Hdb;
pub(crate) use ops::Ops;
pub(crate) use ptp::Ptp;
pub(crate) use red::Red;
pub(crate) use unit3d::Unit3d;
