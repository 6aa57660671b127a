use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};

pub type CancelFlag = Arc<AtomicBool>;

pub fn cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(flag: &CancelFlag) -> bool {
    flag.load(Ordering::Relaxed)
}

pub fn cancel(flag: &CancelFlag) {
    flag.store(true, Ordering::Relaxed);
}

/// Set `flag` on SIGINT/SIGTERM
pub fn cancel_on_interrupt(flag: &CancelFlag) -> Result<()> {
    let flag = Arc::clone(flag);
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, shutting down");
        flag.store(true, Ordering::Relaxed);
    })
    .context("installing interrupt handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let flag = cancel_flag();
        let other = Arc::clone(&flag);
        assert!(!is_cancelled(&other));
        cancel(&flag);
        assert!(is_cancelled(&other));
    }
}
