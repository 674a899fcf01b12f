//! Wall-clock silence watchdog.
//!
//! The frame-count end conditions only advance while frames arrive. If
//! the capture callback stalls mid-episode (device unplugged, driver
//! hiccup), no silent frame would ever end the episode. The watchdog
//! runs on its own thread, re-armed on every frame that carries speech
//! evidence, and latches a flag the pipeline polls each iteration.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

enum WatchdogCommand {
    Arm,
    Disarm,
    Shutdown,
}

pub struct SilenceWatchdog {
    commands: crossbeam_channel::Sender<WatchdogCommand>,
    fired: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SilenceWatchdog {
    pub fn new(timeout: Duration) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let (commands, rx) = crossbeam_channel::unbounded::<WatchdogCommand>();
        let thread_fired = Arc::clone(&fired);

        let thread = std::thread::spawn(move || {
            let mut deadline: Option<Instant> = None;
            loop {
                let command = match deadline {
                    Some(at) => {
                        let now = Instant::now();
                        if at <= now {
                            thread_fired.store(true, Ordering::SeqCst);
                            deadline = None;
                            continue;
                        }
                        match rx.recv_timeout(at - now) {
                            Ok(command) => command,
                            Err(RecvTimeoutError::Timeout) => {
                                thread_fired.store(true, Ordering::SeqCst);
                                deadline = None;
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match rx.recv() {
                        Ok(command) => command,
                        Err(_) => break,
                    },
                };

                match command {
                    WatchdogCommand::Arm => {
                        deadline = Some(Instant::now() + timeout);
                        // A stale latch from a previous episode must not
                        // end the one being armed for.
                        thread_fired.store(false, Ordering::SeqCst);
                    }
                    WatchdogCommand::Disarm => deadline = None,
                    WatchdogCommand::Shutdown => break,
                }
            }
        });

        Self {
            commands,
            fired,
            thread: Some(thread),
        }
    }

    /// (Re-)start the countdown. Called on every frame with speech
    /// evidence, so the deadline tracks the last time anything was heard.
    pub fn arm(&self) {
        let _ = self.commands.send(WatchdogCommand::Arm);
    }

    /// Cancel the countdown without firing.
    pub fn disarm(&self) {
        let _ = self.commands.send(WatchdogCommand::Disarm);
    }

    /// Consume the latched timeout, if any.
    pub fn take_fired(&self) -> bool {
        self.fired.swap(false, Ordering::SeqCst)
    }
}

impl Drop for SilenceWatchdog {
    fn drop(&mut self) {
        let _ = self.commands.send(WatchdogCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
