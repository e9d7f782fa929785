use {
    crate::{
        error::{Error, Result},
        stats::NUM_UNPINNED_WORKERS,
        sys,
    },
    crossbeam::sync::WaitGroup,
    flume::{Receiver, Sender},
    std::{
        io, mem,
        sync::atomic::Ordering::Relaxed,
        thread::{self, JoinHandle},
    },
};

pub type Job = Box<dyn FnOnce() + Send>;

/// Object that aborts the process when it is dropped. Usually because of panic=unwind.
///
/// A job that unwinds would otherwise still release its wait-group token and the caller would
/// see a completed repetition that never happened.
struct AbortOnDrop;

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        std::process::abort();
    }
}

fn worker_thread(id: usize, cpu: Option<usize>, rx: Receiver<Job>) {
    if let Some(cpu) = cpu {
        match sys::pin_current_thread(cpu) {
            Ok(()) => log::debug!("worker {} pinned to cpu {}", id, cpu),
            Err(e) => {
                NUM_UNPINNED_WORKERS.fetch_add(1, Relaxed);
                log::warn!("worker {} could not be pinned to cpu {}: {}", id, cpu, e);
            }
        }
    }
    // Run all jobs until the pair is dropped.
    while let Ok(job) = rx.recv() {
        job();
    }
}

fn spawn_worker(id: usize, cpu: Option<usize>) -> Result<(Sender<Job>, JoinHandle<()>)> {
    let (tx, rx) = flume::unbounded();
    let handle = thread::Builder::new()
        .name(format!("cache-fx-worker {}", id))
        .spawn(move || worker_thread(id, cpu, rx))
        .map_err(Error::Spawn)?;
    Ok((tx, handle))
}

/// Picks two allowed CPUs that sit on different physical cores.
fn select_cpus() -> [Option<usize>; 2] {
    let cpus = match sys::allowed_cpus() {
        Ok(cpus) => cpus,
        Err(e) => {
            NUM_UNPINNED_WORKERS.fetch_add(2, Relaxed);
            log::warn!("could not query cpu affinity: {}", e);
            return [None, None];
        }
    };
    match pick_separate_cores(&cpus, sys::thread_siblings) {
        Some([first, second]) => [Some(first), Some(second)],
        None => {
            NUM_UNPINNED_WORKERS.fetch_add(2, Relaxed);
            log::warn!(
                "no two of the {} available cpu(s) are on separate cores, workers are not pinned",
                cpus.len()
            );
            [None, None]
        }
    }
}

/// Returns the first pair of `cpus` whose hardware-thread sibling sets are disjoint.
///
/// A CPU whose topology cannot be read counts as a core of its own.
fn pick_separate_cores(
    cpus: &[usize],
    siblings: impl Fn(usize) -> io::Result<Vec<usize>>,
) -> Option<[usize; 2]> {
    let cores: Vec<(usize, Vec<usize>)> = cpus
        .iter()
        .map(|&cpu| {
            let mut set = siblings(cpu).unwrap_or_else(|e| {
                log::debug!("no topology for cpu {}: {}", cpu, e);
                Vec::new()
            });
            if !set.contains(&cpu) {
                set.push(cpu);
            }
            (cpu, set)
        })
        .collect();
    for (idx, (first, first_set)) in cores.iter().enumerate() {
        for (second, second_set) in &cores[idx + 1..] {
            if first_set.iter().all(|cpu| !second_set.contains(cpu)) {
                return Some([*first, *second]);
            }
        }
    }
    None
}

/// Two long-lived worker threads.
///
/// Each call to [`Self::run`] hands one job to each worker and returns once both jobs have
/// completed. With pinning enabled the workers are bound to two different CPUs so that the
/// jobs really execute in parallel.
pub struct WorkerPair {
    senders: Vec<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPair {
    pub fn spawn(pin: bool) -> Result<Self> {
        let cpus = if pin { select_cpus() } else { [None, None] };
        let mut senders = Vec::with_capacity(2);
        let mut handles = Vec::with_capacity(2);
        for (id, cpu) in cpus.into_iter().enumerate() {
            let (tx, handle) = spawn_worker(id, cpu)?;
            senders.push(tx);
            handles.push(handle);
        }
        log::info!("spawned worker pair (cpus {:?})", cpus);
        Ok(Self { senders, handles })
    }

    /// Runs `first` on worker 0 and `second` on worker 1 and waits for both to finish.
    pub fn run<F, G>(&self, first: F, second: G)
    where
        F: FnOnce() + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        let wg = WaitGroup::new();
        self.dispatch(0, Box::new(first), wg.clone());
        self.dispatch(1, Box::new(second), wg.clone());
        wg.wait();
    }

    fn dispatch(&self, worker: usize, job: Job, wg: WaitGroup) {
        let task: Job = Box::new(move || {
            let abort = AbortOnDrop;
            job();
            mem::forget(abort);
            drop(wg);
        });
        if self.senders[worker].send(task).is_err() {
            panic!("worker {} has exited", worker);
        }
    }
}

impl Drop for WorkerPair {
    fn drop(&mut self) {
        // Closing the channels ends the worker loops.
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        parking_lot::Mutex,
        std::sync::{
            atomic::{AtomicUsize, Ordering::SeqCst},
            Arc,
        },
    };

    #[test]
    fn run_waits_for_both_jobs() {
        let workers = WorkerPair::spawn(false).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for round in 1..=20 {
            let (a, b) = (done.clone(), done.clone());
            workers.run(
                move || {
                    thread::sleep(std::time::Duration::from_millis(2));
                    a.fetch_add(1, SeqCst);
                },
                move || {
                    b.fetch_add(1, SeqCst);
                },
            );
            assert_eq!(done.load(SeqCst), 2 * round);
        }
    }

    #[test]
    fn jobs_run_on_separate_named_threads() {
        let workers = WorkerPair::spawn(true).unwrap();
        let names = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (names.clone(), names.clone());
        workers.run(
            move || a.lock().push(thread::current().name().map(str::to_owned)),
            move || b.lock().push(thread::current().name().map(str::to_owned)),
        );
        let mut names = names.lock().clone();
        names.sort();
        assert_eq!(
            names,
            vec![
                Some("cache-fx-worker 0".to_owned()),
                Some("cache-fx-worker 1".to_owned()),
            ]
        );
    }

    #[test]
    fn repetitions_do_not_overlap() {
        let workers = WorkerPair::spawn(false).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for round in 0..10 {
            let (a, b) = (log.clone(), log.clone());
            workers.run(
                move || a.lock().push(round),
                move || b.lock().push(round),
            );
        }
        let log = log.lock();
        assert_eq!(log.len(), 20);
        assert!(log.windows(2).all(|w| w[0] <= w[1]));
    }

    fn topology(cores: &'static [&'static [usize]]) -> impl Fn(usize) -> io::Result<Vec<usize>> {
        move |cpu| {
            cores
                .iter()
                .find(|core| core.contains(&cpu))
                .map(|core| core.to_vec())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown cpu"))
        }
    }

    #[test]
    fn adjacent_hyperthreads_are_skipped() {
        let siblings = topology(&[&[0, 1], &[2, 3]]);
        assert_eq!(pick_separate_cores(&[0, 1, 2, 3], siblings), Some([0, 2]));
    }

    #[test]
    fn interleaved_hyperthreads_pick_first_two() {
        let siblings = topology(&[&[0, 4], &[1, 5]]);
        assert_eq!(pick_separate_cores(&[0, 1, 4, 5], siblings), Some([0, 1]));
    }

    #[test]
    fn single_core_cpuset_is_not_pinned() {
        let siblings = topology(&[&[0, 1], &[2, 3]]);
        assert_eq!(pick_separate_cores(&[2, 3], siblings), None);
        assert_eq!(pick_separate_cores(&[2], topology(&[&[2]])), None);
        assert_eq!(pick_separate_cores(&[], topology(&[])), None);
    }

    #[test]
    fn missing_topology_counts_as_own_core() {
        assert_eq!(pick_separate_cores(&[6, 7], topology(&[])), Some([6, 7]));
    }

    #[test]
    fn drop_joins_workers() {
        let workers = WorkerPair::spawn(false).unwrap();
        workers.run(|| (), || ());
        drop(workers);
    }
}
