use std::time::Duration;

/// How long [`wait`](crate::OsNetworkLibrary::wait) may block, in
/// milliseconds. `-1` blocks until an event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout {
  millis: i32,
}

impl Timeout {
  pub const INFINITE: Timeout = Timeout { millis: -1 };
  pub const ZERO: Timeout = Timeout { millis: 0 };

  /// Saturates at `i32::MAX` milliseconds.
  pub const fn from_millis(millis: u32) -> Self {
    let millis = if millis > i32::MAX as u32 { i32::MAX } else { millis as i32 };
    Timeout { millis }
  }

  /// Sub-millisecond remainders round up so a short non-zero duration
  /// never turns into a busy poll.
  pub fn from_duration(duration: Duration) -> Self {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
      millis += 1;
    }
    Timeout::from_millis(millis.min(u32::MAX as u128) as u32)
  }

  pub const fn as_millis(self) -> i32 {
    self.millis
  }

  pub const fn is_infinite(self) -> bool {
    self.millis < 0
  }

  pub fn as_duration(self) -> Option<Duration> {
    if self.is_infinite() {
      None
    } else {
      Some(Duration::from_millis(self.millis as u64))
    }
  }
}

impl From<Duration> for Timeout {
  fn from(duration: Duration) -> Self {
    Timeout::from_duration(duration)
  }
}

/// Convert a duration to a timespec
#[cfg(kqueue)]
pub(crate) fn duration_to_timespec(duration: Duration) -> libc::timespec {
  libc::timespec {
    tv_sec: duration.as_secs() as libc::time_t,
    tv_nsec: duration.subsec_nanos() as libc::c_long,
  }
}

/// Returns the timespec kevent needs, `None` for an infinite wait.
///
/// The caller keeps the value alive for the duration of the syscall.
#[cfg(kqueue)]
pub(crate) fn timeout_to_timespec(timeout: Timeout) -> Option<libc::timespec> {
  timeout.as_duration().map(duration_to_timespec)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_constants() {
    assert_eq!(Timeout::INFINITE.as_millis(), -1);
    assert!(Timeout::INFINITE.is_infinite());
    assert_eq!(Timeout::INFINITE.as_duration(), None);
    assert_eq!(Timeout::ZERO.as_duration(), Some(Duration::ZERO));
  }

  #[test]
  fn test_from_duration_rounds_up() {
    assert_eq!(Timeout::from(Duration::from_micros(1)).as_millis(), 1);
    assert_eq!(Timeout::from(Duration::from_millis(25)).as_millis(), 25);
    assert_eq!(Timeout::from(Duration::from_micros(25_500)).as_millis(), 26);
  }

  #[test]
  fn test_saturates() {
    assert_eq!(Timeout::from_millis(u32::MAX).as_millis(), i32::MAX);
    assert_eq!(
      Timeout::from(Duration::from_secs(u64::MAX)).as_millis(),
      i32::MAX
    );
  }

  #[cfg(kqueue)]
  #[test]
  fn test_timespec() {
    assert!(timeout_to_timespec(Timeout::INFINITE).is_none());
    let ts = timeout_to_timespec(Timeout::from_millis(1500)).unwrap();
    assert_eq!(ts.tv_sec, 1);
    assert_eq!(ts.tv_nsec, 500_000_000);
  }
}
