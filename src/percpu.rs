//! Run code pinned to each CPU in turn.
//!
//! PMU registers are core-local, so configuring "the PMU" means repeating the same register
//! sequence on every core. These helpers pin a worker thread to one CPU at a time and run the
//! given closure there.

use crate::{Error, Result};
use log::debug;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use std::path::Path;

/// CPU number of a `/sys/devices/system/cpu/cpuN` entry.
fn cpu_number(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix("cpu")?
        .parse()
        .ok()
}

/// Whether the sysfs entry at `path` is online.
///
/// CPUs that cannot be hot-unplugged have no `online` file.
fn is_online(path: &Path) -> Result<bool> {
    match std::fs::read_to_string(path.join("online")) {
        Ok(s) => Ok(s.trim() == "1"),
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Whether `cpu` is in `set`.
///
/// CPU numbers beyond what a `CpuSet` can hold are never allowed.
fn is_allowed(set: &CpuSet, cpu: usize) -> bool {
    set.is_set(cpu).unwrap_or(false)
}

/// Online CPUs this process is allowed to run on, in ascending order.
pub fn online_cpus() -> Result<Vec<usize>> {
    let allowed = sched_getaffinity(Pid::from_raw(0))?;
    let mut cpus = Vec::new();
    for entry in glob::glob("/sys/devices/system/cpu/cpu[0-9]*")? {
        let path = entry?;
        if let Some(cpu) = cpu_number(&path) {
            if is_allowed(&allowed, cpu) && is_online(&path)? {
                cpus.push(cpu);
            }
        }
    }
    cpus.sort_unstable();
    Ok(cpus)
}

/// Run `f` on a thread pinned to `cpu` and return its result.
pub fn on_cpu<F, R>(cpu: usize, f: F) -> Result<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    std::thread::scope(|s| -> Result<R> {
        let handle = std::thread::Builder::new()
            .name(format!("pmu-cpu{}", cpu))
            .spawn_scoped(s, move || -> Result<R> {
                let mut set = CpuSet::new();
                set.set(cpu)?;
                sched_setaffinity(Pid::from_raw(0), &set)?;
                Ok(f())
            })?;
        handle.join().map_err(|_| Error::DispatchFailed(cpu))?
    })
}

/// Run `f` once on every online CPU, one CPU at a time.
///
/// `f` receives the CPU number it runs on. Stops at the first CPU that fails.
pub fn on_each_cpu<F>(f: F) -> Result<()>
where
    F: Fn(usize) + Sync,
{
    for cpu in online_cpus()? {
        on_cpu(cpu, || f(cpu))?;
        debug!("Dispatched to cpu {}", cpu);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cpu_number() {
        assert_eq!(cpu_number(Path::new("/sys/devices/system/cpu/cpu12")), Some(12));
        assert_eq!(cpu_number(Path::new("/sys/devices/system/cpu/cpufreq")), None);
        assert_eq!(cpu_number(Path::new("/sys/devices/system/cpu/cpuidle")), None);
    }

    #[test]
    fn test_is_allowed() {
        let mut set = CpuSet::new();
        set.set(3).unwrap();
        assert!(is_allowed(&set, 3));
        assert!(!is_allowed(&set, 2));
        assert!(!is_allowed(&set, 1 << 20));
    }

    #[test]
    fn test_online_cpus() {
        let cpus = online_cpus().unwrap();
        assert!(!cpus.is_empty());
        assert!(cpus.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_on_cpu_is_pinned() {
        let cpu = online_cpus().unwrap()[0];
        let pinned = on_cpu(cpu, || {
            let set = sched_getaffinity(Pid::from_raw(0)).unwrap();
            (0..1024).filter(|&c| set.is_set(c).unwrap()).collect::<Vec<_>>()
        })
        .unwrap();
        assert_eq!(pinned, vec![cpu]);
    }

    #[test]
    fn test_on_each_cpu_visits_every_cpu() {
        let seen = Mutex::new(Vec::new());
        on_each_cpu(|cpu| seen.lock().unwrap().push(cpu)).unwrap();
        assert_eq!(seen.into_inner().unwrap(), online_cpus().unwrap());
    }

    #[test]
    fn test_panicking_closure() {
        let cpu = online_cpus().unwrap()[0];
        match on_cpu(cpu, || panic!("boom")) {
            Err(Error::DispatchFailed(c)) => assert_eq!(c, cpu),
            other => panic!("unexpected {:?}", other.map(|_: ()| ())),
        }
    }
}
