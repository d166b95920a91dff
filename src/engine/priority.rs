//! Best-effort scheduling priority for the playback thread

/// Real-time priority requested for the playback thread (1-99 scale)
#[cfg(target_os = "linux")]
const PLAYBACK_RT_PRIORITY: libc::c_int = 50;

/// Try to run the calling thread under `SCHED_FIFO`
///
/// Needs `CAP_SYS_NICE` or root; without it the thread keeps its normal
/// priority and a warning is logged. Returns whether the change took effect.
#[cfg(target_os = "linux")]
pub(crate) fn raise_current_thread() -> bool {
    // SAFETY: sched_param is plain data, and pid 0 targets the calling thread
    let result = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = PLAYBACK_RT_PRIORITY;
        libc::sched_setscheduler(0, libc::SCHED_FIFO, &param)
    };

    if result == 0 {
        tracing::info!(
            priority = PLAYBACK_RT_PRIORITY,
            "Playback thread running with real-time priority (SCHED_FIFO)"
        );
        true
    } else {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            "Failed to set real-time priority for playback (need CAP_SYS_NICE or root)"
        );
        false
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn raise_current_thread() -> bool {
    tracing::debug!("Real-time priority not supported on this platform");
    false
}
