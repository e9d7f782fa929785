use {once_cell::sync::Lazy, std::io};

/// Number of CPUs the process may use.
pub static NUM_CPUS: Lazy<usize> = Lazy::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
});

/// Cache geometry is not discoverable on this target.
pub static CACHE_LINE_SIZE_HINT: Lazy<Option<usize>> = Lazy::new(|| None);

pub fn allowed_cpus() -> io::Result<Vec<usize>> {
    Ok((0..*NUM_CPUS).collect())
}

pub fn pin_current_thread(_cpu: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread affinity is not supported on this target",
    ))
}

pub fn thread_siblings(cpu: usize) -> io::Result<Vec<usize>> {
    Ok(vec![cpu])
}
