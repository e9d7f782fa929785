use {
    once_cell::sync::Lazy,
    std::{io, mem, str::FromStr},
};

const POSSIBLE_PATH: &str = "/sys/devices/system/cpu/possible";
const LINE_SIZE_PATH: &str = "/sys/devices/system/cpu/cpu0/cache/index0/coherency_line_size";

const BITS_PER_USIZE: usize = mem::size_of::<usize>() * 8;

/// `nr_cpu_ids`, or the reason it could not be determined.
static POSSIBLE_CPUS: Lazy<Result<usize, String>> =
    Lazy::new(|| possible_cpus_from(std::fs::read_to_string(POSSIBLE_PATH)));

/// Computes the highest possible index of a CPU in this system plus 1.
///
/// This is the kernel's `nr_cpu_ids`. Affinity masks passed to the kernel must be at least this
/// many bits wide.
pub static NUM_CPUS: Lazy<usize> = Lazy::new(|| match &*POSSIBLE_CPUS {
    Ok(n) => *n,
    Err(e) => panic!("{}", e),
});

/// The coherency line size of the first data cache of cpu 0, if the kernel exposes it.
pub static CACHE_LINE_SIZE_HINT: Lazy<Option<usize>> = Lazy::new(|| {
    let raw = std::fs::read_to_string(LINE_SIZE_PATH).ok()?;
    usize::from_str(raw.trim()).ok()
});

fn possible_cpus_from(raw: io::Result<String>) -> Result<usize, String> {
    let raw = raw.map_err(|e| format!("Could not read {}: {}", POSSIBLE_PATH, e))?;
    parse_cpu_list(&raw)
        .and_then(|cpus| cpus.into_iter().max())
        .map(|last| last + 1)
        .ok_or_else(|| format!("Could not parse {}: {:?}", POSSIBLE_PATH, raw.trim()))
}

fn possible_cpus() -> io::Result<usize> {
    POSSIBLE_CPUS
        .clone()
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

fn mask_len() -> io::Result<usize> {
    Ok(possible_cpus()? / BITS_PER_USIZE + 1)
}

/// Parses a kernel cpu list such as `0-3,8,10-11`.
fn parse_cpu_list(list: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo = usize::from_str(lo).ok()?;
                let hi = usize::from_str(hi).ok()?;
                if lo > hi {
                    return None;
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(usize::from_str(part).ok()?),
        }
    }
    Some(cpus)
}

/// Hardware threads that share a physical core with `cpu`, `cpu` included.
pub fn thread_siblings(cpu: usize) -> io::Result<Vec<usize>> {
    let path = format!(
        "/sys/devices/system/cpu/cpu{}/topology/thread_siblings_list",
        cpu
    );
    let raw = std::fs::read_to_string(&path)?;
    parse_cpu_list(&raw).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Could not parse {}: {:?}", path, raw.trim()),
        )
    })
}

/// See https://man7.org/linux/man-pages/man2/sched_setaffinity.2.html
fn sched_setaffinity(pid: libc::pid_t, mask: &[usize]) -> io::Result<()> {
    let res = unsafe {
        libc::syscall(
            libc::SYS_sched_setaffinity,
            pid as usize,
            mem::size_of_val(mask),
            mask.as_ptr() as usize,
        )
    };
    if res == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn sched_getaffinity(pid: libc::pid_t, mask: &mut [usize]) -> io::Result<()> {
    let res = unsafe {
        libc::syscall(
            libc::SYS_sched_getaffinity,
            pid as usize,
            mem::size_of_val(mask),
            mask.as_mut_ptr() as usize,
        )
    };
    if res == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Returns the CPUs the calling thread is allowed to run on, in ascending order.
pub fn allowed_cpus() -> io::Result<Vec<usize>> {
    let mut mask = vec![0; mask_len()?];
    sched_getaffinity(0, &mut mask)?;
    let cpus = mask
        .iter()
        .enumerate()
        .flat_map(|(idx, word)| {
            (0..BITS_PER_USIZE)
                .filter(move |&bit| word & (1usize << bit) != 0)
                .map(move |bit| idx * BITS_PER_USIZE + bit)
        })
        .collect();
    Ok(cpus)
}

/// Restricts the calling thread to cpu `cpu`.
pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
    if cpu >= possible_cpus()? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cpu {} does not exist", cpu),
        ));
    }
    let idx = cpu / BITS_PER_USIZE;
    let offset = cpu % BITS_PER_USIZE;
    let mut mask = vec![0; mask_len()?];
    mask[idx] = 1 << offset;
    sched_setaffinity(0, &mask)
}
