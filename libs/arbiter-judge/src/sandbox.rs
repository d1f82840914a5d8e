//! Process containment for candidate programs.
//!
//! Everything in `SandboxPolicy::enter` runs in the forked child between
//! `fork` and `exec`, so it sticks to raw syscalls: no allocation, no logging.
//! Paths are turned into `CString`s up front by `JailPlan::prepare`, and the
//! child tells the parent what it managed to set up through `IsolationReport`.

use crate::config::ResourceLimits;
use std::ffi::{CStr, CString};
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use tokio::process::Command;

const NETWORK: u8 = 0b01;
const FILESYSTEM: u8 = 0b10;

/// Device nodes the interpreter may open, bound read-write into the jail.
pub const JAIL_DEVICES: &[&str] = &["/dev/null", "/dev/zero", "/dev/urandom"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxPolicy {
    cpu_time_secs: u64,
    address_space_bytes: u64,
    max_processes: Option<u64>,
    deny_network: bool,
    strict: bool,
}

/// Which namespace layers were in effect for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Isolation {
    pub network: bool,
    pub filesystem: bool,
}

impl Isolation {
    fn from_bits(bits: u8) -> Self {
        Self {
            network: bits & NETWORK != 0,
            filesystem: bits & FILESYSTEM != 0,
        }
    }

    /// True when every layer in `requested` is also in `self`.
    pub fn covers(&self, requested: Isolation) -> bool {
        (self.network || !requested.network) && (self.filesystem || !requested.filesystem)
    }
}

impl SandboxPolicy {
    pub fn from_limits(limits: &ResourceLimits) -> Self {
        Self {
            cpu_time_secs: limits.cpu_time_secs.max(1),
            address_space_bytes: limits.memory_limit_mb.saturating_mul(1024 * 1024),
            max_processes: limits.max_processes,
            deny_network: limits.deny_network,
            strict: limits.strict,
        }
    }

    /// Layers this policy asks for when run with or without a jail.
    pub fn requested(&self, jailed: bool) -> Isolation {
        Isolation {
            network: self.deny_network,
            filesystem: jailed,
        }
    }

    /// Install the policy on `cmd`. The child also leads a new process group
    /// so a timeout can take down everything it spawned.
    pub fn apply(&self, cmd: &mut Command, jail: Option<JailPlan>, report: &IsolationReport) {
        let policy = *self;
        let report_fd = report.child_fd();
        cmd.process_group(0);
        // SAFETY: `enter` only performs async-signal-safe syscalls and reads
        // memory prepared before the fork.
        unsafe {
            cmd.pre_exec(move || policy.enter(jail.as_ref(), report_fd));
        }
    }

    fn enter(&self, jail: Option<&JailPlan>, report_fd: RawFd) -> io::Result<()> {
        // soft limit raises SIGXCPU, hard limit one second later is SIGKILL
        set_limit(libc::RLIMIT_CPU, self.cpu_time_secs, self.cpu_time_secs + 1)?;
        set_limit(libc::RLIMIT_AS, self.address_space_bytes, self.address_space_bytes)?;
        // candidate code may not create or grow files
        set_limit(libc::RLIMIT_FSIZE, 0, 0)?;
        set_limit(libc::RLIMIT_CORE, 0, 0)?;

        if let Some(procs) = self.max_processes {
            set_limit(libc::RLIMIT_NPROC, procs, procs)?;
        }

        let mut flags = 0;
        if self.deny_network {
            flags |= libc::CLONE_NEWNET;
        }
        if jail.is_some() {
            flags |= libc::CLONE_NEWNS;
        }

        let mut granted = 0u8;
        if flags != 0 {
            // SAFETY: plain syscall on the single-threaded forked child.
            if unsafe { libc::unshare(libc::CLONE_NEWUSER | flags) } == 0 {
                if self.deny_network {
                    granted |= NETWORK;
                }
                if let Some(jail) = jail {
                    match jail.enter() {
                        Ok(()) => granted |= FILESYSTEM,
                        Err(e) if self.strict => return Err(e),
                        Err(_) => {}
                    }
                }
            } else if self.strict {
                return Err(io::Error::last_os_error());
            }
        }

        // SAFETY: prctl(PR_SET_NO_NEW_PRIVS, 1) has no memory-safety requirements.
        if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 && self.strict {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: writes one byte from a live stack value to an fd we own.
        unsafe {
            libc::write(report_fd, &granted as *const u8 as *const libc::c_void, 1);
        }
        Ok(())
    }
}

fn set_limit(resource: libc::__rlimit_resource_t, soft: u64, hard: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };

    // SAFETY: `limit` is a valid, initialized rlimit for the call's duration.
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BindMount {
    source: CString,
    target: CString,
    read_only: bool,
}

/// A per-run root directory the child chroots into.
///
/// Only the bound paths and the run's working directory exist inside it.
/// The working directory keeps its host path so the script path and the
/// current directory are the same with or without the jail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailPlan {
    root: CString,
    workdir: CString,
    mounts: Vec<BindMount>,
}

impl JailPlan {
    /// Create mount points under `root` and record the binds to make.
    ///
    /// Missing sources are skipped. All paths must be absolute.
    pub fn prepare(
        root: &Path,
        read_only_paths: &[PathBuf],
        devices: &[PathBuf],
        workdir: &Path,
    ) -> io::Result<Self> {
        let root = root.canonicalize()?;
        let mut mounts = Vec::new();

        for (sources, read_only) in [(read_only_paths, true), (devices, false)] {
            for source in sources.iter().filter(|s| s.exists()) {
                let target = mount_point(&root, source)?;
                mounts.push(BindMount {
                    source: c_path(source)?,
                    target: c_path(&target)?,
                    read_only,
                });
            }
        }

        let target = mount_point(&root, workdir)?;
        mounts.push(BindMount {
            source: c_path(workdir)?,
            target: c_path(&target)?,
            read_only: false,
        });

        Ok(Self {
            root: c_path(&root)?,
            workdir: c_path(workdir)?,
            mounts,
        })
    }

    fn enter(&self) -> io::Result<()> {
        const SLASH: &CStr = c"/";

        // keep the binds below out of the parent's mount table
        // SAFETY: all pointers are NUL-terminated strings owned by `self`.
        check(unsafe {
            libc::mount(
                ptr::null(),
                SLASH.as_ptr(),
                ptr::null(),
                libc::MS_REC | libc::MS_PRIVATE,
                ptr::null(),
            )
        })?;

        for mount in &self.mounts {
            // SAFETY: as above.
            check(unsafe {
                libc::mount(
                    mount.source.as_ptr(),
                    mount.target.as_ptr(),
                    ptr::null(),
                    libc::MS_BIND | libc::MS_REC,
                    ptr::null(),
                )
            })?;
            if mount.read_only {
                remount_read_only(&mount.target)?;
            }
        }

        // SAFETY: as above.
        check(unsafe { libc::chroot(self.root.as_ptr()) })?;
        check(unsafe { libc::chdir(self.workdir.as_ptr()) })
    }
}

fn remount_read_only(target: &CStr) -> io::Result<()> {
    // SAFETY: an all-zero statvfs is a valid out-parameter.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `target` is NUL-terminated and `stat` outlives the call.
    check(unsafe { libc::statvfs(target.as_ptr(), &mut stat) })?;

    // a remount inside a user namespace must keep the source's locked flags
    let mut flags =
        libc::MS_REMOUNT | libc::MS_BIND | libc::MS_RDONLY | libc::MS_NOSUID | libc::MS_NODEV;
    if stat.f_flag & libc::ST_NOEXEC != 0 {
        flags |= libc::MS_NOEXEC;
    }

    // SAFETY: as above.
    check(unsafe {
        libc::mount(
            ptr::null(),
            target.as_ptr(),
            ptr::null(),
            flags,
            ptr::null(),
        )
    })
}

/// Create the directory or empty file `source` will be bound onto.
fn mount_point(root: &Path, source: &Path) -> io::Result<PathBuf> {
    let relative = source.strip_prefix("/").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("jail path must be absolute: {}", source.display()),
        )
    })?;
    let target = root.join(relative);

    if source.is_dir() {
        fs::create_dir_all(&target)?;
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&target)?;
    }
    Ok(target)
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Close-on-exec pipe the child writes its granted isolation into.
///
/// `Command::spawn` returns only after the child has exec'd or failed, so
/// by then the byte is already in the pipe.
pub struct IsolationReport {
    read: File,
    write: Option<OwnedFd>,
}

impl IsolationReport {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors pipe2 writes.
        check(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
        // SAFETY: both descriptors were just created and are owned by nobody else.
        let (read, write) = unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self {
            read,
            write: Some(write),
        })
    }

    fn child_fd(&self) -> RawFd {
        self.write.as_ref().map(|fd| fd.as_raw_fd()).unwrap_or(-1)
    }

    /// Read what the child reported. `None` when it never got that far.
    pub fn collect(mut self) -> Option<Isolation> {
        drop(self.write.take());
        let mut byte = [0u8; 1];
        match self.read.read(&mut byte) {
            Ok(1) => Some(Isolation::from_bits(byte[0])),
            _ => None,
        }
    }
}

/// True when some process in group `pgid` is still ours to signal.
pub fn process_group_alive(pgid: u32) -> bool {
    // signal 0 only checks existence and permission
    // SAFETY: no memory-safety requirements.
    unsafe { libc::kill(-(pgid as libc::pid_t), 0) == 0 }
}

/// Kill every process in the group led by `pgid`.
///
/// Does nothing once the group is empty, so a recycled id is never hit.
pub fn kill_process_group(pgid: u32) -> bool {
    if !process_group_alive(pgid) {
        return false;
    }
    // SAFETY: signalling a process group has no memory-safety requirements.
    unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) == 0 }
}

/// Human-readable signal name for error messages.
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        libc::SIGXCPU => "SIGXCPU",
        libc::SIGXFSZ => "SIGXFSZ",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGTERM => "SIGTERM",
        _ => "unknown signal",
    }
}
