use std::sync::OnceLock;

use here4::pump::StopToken;

static STOP: OnceLock<StopToken> = OnceLock::new();

extern "C" fn on_signal(_sig: libc::c_int) {
    // only an atomic store; nothing here may allocate or lock
    if let Some(stop) = STOP.get() {
        stop.stop();
    }
}

/// Stop `token` on SIGINT or SIGTERM. Only the first registered token is used.
pub fn stop_on_signal(token: &StopToken) {
    let _ = STOP.set(token.clone());
    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }
}
