mod decoder;
mod fleet;
mod inventory;
mod prober;
mod run;
mod wait;

pub use self::decoder::*;
pub use self::fleet::*;
pub use self::inventory::*;
pub use self::prober::*;
pub use self::run::*;
pub use self::wait::*;

pub trait InternalEvent {
    fn emit_logs(&self) {}
    fn emit_metrics(&self) {}
}

pub fn emit(event: impl InternalEvent) {
    event.emit_logs();
    event.emit_metrics();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event);
    };
}
