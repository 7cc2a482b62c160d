//! Raw-terminal control surface: polls stdin for the single-character
//! `q` (quit) and `v` (verify) commands without waiting for Enter.

use image::RgbImage;
use std::io;
use std::time::Duration;
use veriface_core::backend::{ControlSurface, Key};

pub struct TerminalSurface {
    fd: libc::c_int,
    saved: libc::termios,
}

impl TerminalSurface {
    /// Switch stdin to non-canonical, no-echo mode. The previous terminal
    /// state is restored on drop.
    pub fn new() -> io::Result<Self> {
        let fd = libc::STDIN_FILENO;
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { fd, saved })
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}

impl ControlSurface for TerminalSurface {
    /// Headless surface: frames are not rendered here. Annotated frames are
    /// persisted through the loop's snapshot path instead.
    fn show(&mut self, _frame: &RgbImage) {}

    fn poll_key(&mut self, timeout: Duration) -> Option<Key> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as libc::c_int) };
        if ready <= 0 {
            return None;
        }

        let mut byte = 0u8;
        let n = unsafe { libc::read(self.fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if n != 1 {
            return None;
        }
        match byte {
            b'q' => Some(Key::Quit),
            b'v' => Some(Key::Verify),
            _ => None,
        }
    }
}
