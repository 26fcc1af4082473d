//! Freezing and thawing a running player.
//!
//! On unix this is SIGSTOP/SIGCONT on the whole process. Windows has no
//! process-wide equivalent, so every thread owned by the process is
//! suspended or resumed individually.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
  #[error("Failed to suspend pid {pid}: {reason}")]
  Suspend { pid: u32, reason: String },
  #[error("Failed to resume pid {pid}: {reason}")]
  Resume { pid: u32, reason: String },
}

/// Suspend/resume capability over an OS process id.
pub trait ProcessControl: Send + Sync {
  /// Freeze execution in place; resources are retained.
  fn suspend(&self, pid: u32) -> Result<(), ControlError>;
  /// Continue a frozen process. Resuming a running process is a no-op.
  fn resume(&self, pid: u32) -> Result<(), ControlError>;
}

#[cfg(unix)]
pub use unix::SignalControl as PlatformControl;
#[cfg(windows)]
pub use windows_impl::ThreadControl as PlatformControl;

#[cfg(unix)]
mod unix {
  use nix::sys::signal::{kill, Signal};
  use nix::unistd::Pid;

  use super::{ControlError, ProcessControl};

  /// Whole-process SIGSTOP/SIGCONT.
  #[derive(Debug, Default, Clone, Copy)]
  pub struct SignalControl;

  impl ProcessControl for SignalControl {
    fn suspend(&self, pid: u32) -> Result<(), ControlError> {
      kill(Pid::from_raw(pid as i32), Signal::SIGSTOP).map_err(|e| ControlError::Suspend {
        pid,
        reason: e.desc().to_string(),
      })
    }

    fn resume(&self, pid: u32) -> Result<(), ControlError> {
      kill(Pid::from_raw(pid as i32), Signal::SIGCONT).map_err(|e| ControlError::Resume {
        pid,
        reason: e.desc().to_string(),
      })
    }
  }
}

#[cfg(windows)]
mod windows_impl {
  use windows::Win32::Foundation::{CloseHandle, HANDLE};
  use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
  };
  use windows::Win32::System::Threading::{
    OpenThread, ResumeThread, SuspendThread, THREAD_SUSPEND_RESUME,
  };

  use super::{ControlError, ProcessControl};

  const THREAD_CALL_FAILED: u32 = u32::MAX;

  /// Per-thread SuspendThread/ResumeThread over a toolhelp snapshot.
  #[derive(Debug, Default, Clone, Copy)]
  pub struct ThreadControl;

  /// Run `f` on every thread owned by `pid`.
  fn for_each_thread(pid: u32, f: impl Fn(HANDLE) -> u32) -> Result<(), String> {
    unsafe {
      let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0).map_err(|e| e.to_string())?;

      let mut entry = THREADENTRY32 {
        dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
        ..Default::default()
      };

      let mut result = Ok(());
      let mut more = Thread32First(snapshot, &mut entry).is_ok();
      while more {
        if entry.th32OwnerProcessID == pid {
          match OpenThread(THREAD_SUSPEND_RESUME, false, entry.th32ThreadID) {
            Ok(thread) => {
              let rc = f(thread);
              let _ = CloseHandle(thread);
              if rc == THREAD_CALL_FAILED {
                result = Err(windows::core::Error::from_win32().to_string());
                break;
              }
            }
            Err(e) => {
              result = Err(e.to_string());
              break;
            }
          }
        }
        more = Thread32Next(snapshot, &mut entry).is_ok();
      }

      let _ = CloseHandle(snapshot);
      result
    }
  }

  impl ProcessControl for ThreadControl {
    fn suspend(&self, pid: u32) -> Result<(), ControlError> {
      for_each_thread(pid, |t| unsafe { SuspendThread(t) })
        .map_err(|reason| ControlError::Suspend { pid, reason })
    }

    fn resume(&self, pid: u32) -> Result<(), ControlError> {
      for_each_thread(pid, |t| unsafe { ResumeThread(t) })
        .map_err(|reason| ControlError::Resume { pid, reason })
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::player::process::PlayerLauncher;

  fn process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // Field 3, after the parenthesised command name.
    stat.rsplit(')').next()?.trim_start().chars().next()
  }

  #[tokio::test]
  async fn test_suspend_and_resume_real_process() {
    let handle = PlayerLauncher::new("sleep", Vec::new()).spawn("30").unwrap();
    let control = PlatformControl;

    control.suspend(handle.pid()).unwrap();
    if cfg!(target_os = "linux") {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      assert_eq!(process_state(handle.pid()), Some('T'));
    }

    control.resume(handle.pid()).unwrap();
    // Resuming twice is harmless.
    control.resume(handle.pid()).unwrap();
    if cfg!(target_os = "linux") {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      assert_ne!(process_state(handle.pid()), Some('T'));
    }

    handle.kill().await;
  }
}
