// SPDX-License-Identifier: MPL-2.0

//! VFS scenarios: permission checking, mount-tree lifetime, the generic
//! directory driver, the registry, and the thread-info filesystem.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex as StdMutex,
};

use silene_frame::{task::Priority, time};
use silene_kernel::{
    error::Errno,
    fs::{self, Driver, DriverHandle, FileSystemType, OpenFlags},
    sched,
    thread::{ThreadOptions, ThreadState},
};

static SERIAL: StdMutex<()> = StdMutex::new(());

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn drive_until(cond: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        time::advance_ns(1_000_000);
        sched::schedule();
    }
    panic!("the scenario did not converge");
}

/// A device whose reads and writes always claim one byte.
#[derive(Debug)]
struct EchoDriver;

impl Driver for EchoDriver {
    fn open(&self, _relpath: &str, _flags: OpenFlags, _mode: u32) -> fs::Result<DriverHandle> {
        Ok(Arc::new(()))
    }
    fn read(&self, _handle: &DriverHandle, _buf: &mut [u8]) -> fs::Result<usize> {
        Ok(1)
    }
    fn write(&self, _handle: &DriverHandle, _buf: &[u8]) -> fs::Result<usize> {
        Ok(1)
    }
}

#[test]
fn permission_bits_gate_reads_and_writes() {
    let _guard = serial();
    silene_kernel::init(1);

    fs::register_driver("/dev/x", Arc::new(EchoDriver)).unwrap();

    let fd = fs::open("/dev/x", OpenFlags::WRITE, 0).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(
        fs::read(fd, &mut buf).unwrap_err().error(),
        Errno::UnauthorizedAction
    );
    assert_eq!(fs::write(fd, b"y").unwrap(), 1);
    fs::close(fd).unwrap();

    let fd = fs::open("/dev/x", OpenFlags::READWRITE, 0).unwrap();
    assert_eq!(fs::read(fd, &mut buf).unwrap(), 1);
    assert_eq!(fs::write(fd, b"y").unwrap(), 1);
    fs::close(fd).unwrap();
    assert_eq!(fs::close(fd).unwrap_err().error(), Errno::NoSuchId);

    fs::unregister_driver("/dev/x").unwrap();
}

#[test]
fn transient_directories_list_and_prune() {
    let _guard = serial();
    silene_kernel::init(1);

    fs::register_driver("/x/b/c", Arc::new(EchoDriver)).unwrap();
    fs::register_driver("/x/b/d", Arc::new(EchoDriver)).unwrap();

    let list = |path: &str| -> Vec<String> {
        let fd = fs::open(path, OpenFlags::READ, 0).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = fs::readdir(fd).unwrap() {
            names.push(entry.name().to_string());
        }
        fs::close(fd).unwrap();
        names
    };

    assert_eq!(list("/x/b"), ["c", "d"]);
    // A pure directory rejects data I/O.
    let fd = fs::open("/x", OpenFlags::READWRITE, 0).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(fs::read(fd, &mut buf).unwrap_err().error(), Errno::NotSupported);
    assert_eq!(fs::write(fd, b"z").unwrap_err().error(), Errno::NotSupported);
    fs::close(fd).unwrap();

    fs::unregister_driver("/x/b/c").unwrap();
    // `/x/b` survives: `/x/b/d` still needs it.
    assert_eq!(list("/x/b"), ["d"]);

    fs::unregister_driver("/x/b/d").unwrap();
    // Everything driverless above is pruned now.
    assert_eq!(
        fs::open("/x/b", OpenFlags::READ, 0).unwrap_err().error(),
        Errno::NoSuchId
    );
    assert_eq!(
        fs::open("/x", OpenFlags::READ, 0).unwrap_err().error(),
        Errno::NoSuchId
    );
}

#[derive(Debug)]
struct EchoFs {
    mounts: AtomicUsize,
    unmounts: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct CountingUnmount {
    unmounts: Arc<AtomicUsize>,
}

impl Driver for CountingUnmount {
    fn open(&self, _relpath: &str, _flags: OpenFlags, _mode: u32) -> fs::Result<DriverHandle> {
        Ok(Arc::new(()))
    }
    fn read(&self, _handle: &DriverHandle, _buf: &mut [u8]) -> fs::Result<usize> {
        Ok(0)
    }
    fn unmount(&self) -> fs::Result<()> {
        self.unmounts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl FileSystemType for EchoFs {
    fn name(&self) -> &'static str {
        "echofs"
    }
    fn mount(&self, _args: &str) -> fs::Result<Arc<dyn Driver>> {
        self.mounts.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CountingUnmount {
            unmounts: self.unmounts.clone(),
        }))
    }
}

lazy_static::lazy_static! {
    static ref ECHO_FS: EchoFs = EchoFs {
        mounts: AtomicUsize::new(0),
        unmounts: Arc::new(AtomicUsize::new(0)),
    };
}

#[test]
fn mount_and_unmount_go_through_the_registry() {
    let _guard = serial();
    silene_kernel::init(1);

    fs::register_filesystem(&*ECHO_FS).unwrap();
    assert_eq!(
        fs::mount("nosuchfs", "/mnt/a", "").unwrap_err().error(),
        Errno::NoSuchId
    );

    fs::mount("echofs", "/mnt/data", "").unwrap();
    assert_eq!(ECHO_FS.mounts.load(Ordering::Relaxed), 1);

    let fd = fs::open("/mnt/data/file", OpenFlags::READ, 0).unwrap();
    assert_eq!(fs::read(fd, &mut [0u8; 4]).unwrap(), 0);
    fs::close(fd).unwrap();

    fs::unmount("/mnt/data").unwrap();
    assert_eq!(ECHO_FS.unmounts.load(Ordering::Relaxed), 1);
    assert_eq!(
        fs::open("/mnt/data/file", OpenFlags::READ, 0)
            .unwrap_err()
            .error(),
        Errno::NoSuchId
    );
}

#[test]
fn paths_are_canonicalized_and_validated() {
    let _guard = serial();
    silene_kernel::init(1);

    fs::register_driver("/dev//noisy/", Arc::new(EchoDriver)).unwrap();
    let fd = fs::open("/dev///noisy", OpenFlags::READ, 0).unwrap();
    fs::close(fd).unwrap();
    fs::unregister_driver("/dev/noisy").unwrap();

    assert_eq!(
        fs::open("dev/x", OpenFlags::READ, 0).unwrap_err().error(),
        Errno::IncorrectValue
    );
}

#[test]
fn threadfs_reports_live_threads() {
    let _guard = serial();
    silene_kernel::init(1);

    let report = Arc::new(StdMutex::new(None));
    let sink = report.clone();
    let worker = ThreadOptions::new(move || {
        let me = sched::current_thread().unwrap();
        let path = format!("/sys/threads/{}", me.tid());
        let fd = fs::open(&path, OpenFlags::READ, 0).unwrap();
        let mut buf = [0u8; 256];
        let len = fs::read(fd, &mut buf).unwrap();
        fs::close(fd).unwrap();

        // The directory names us by decimal tid.
        let dir = fs::open("/sys/threads", OpenFlags::READ, 0).unwrap();
        let mut listed = false;
        while let Some(entry) = fs::readdir(dir).unwrap() {
            if entry.name() == format!("{}", me.tid()) {
                listed = true;
            }
        }
        fs::close(dir).unwrap();

        *sink.lock().unwrap() =
            Some((String::from_utf8_lossy(&buf[..len]).into_owned(), listed, me.tid()));
        0
    })
    .name("introspect")
    .priority(Priority::new(12))
    .spawn()
    .unwrap();

    drive_until(|| worker.state() == ThreadState::Zombie);
    let (text, listed, tid) = report.lock().unwrap().take().unwrap();
    assert!(listed);
    assert!(text.contains(&format!("id: {}", tid)));
    assert!(text.contains("name: introspect"));
    assert!(text.contains("state: RUNNING"));
    assert!(text.contains("type: kernel"));
    assert!(text.contains("priority: 12"));
    sched::reap_zombies();
}

#[test]
fn readdir_requires_the_read_bit() {
    let _guard = serial();
    silene_kernel::init(1);

    fs::register_driver("/gated/leaf", Arc::new(EchoDriver)).unwrap();
    let fd = fs::open("/gated", OpenFlags::WRITE, 0).unwrap();
    assert_eq!(
        fs::readdir(fd).unwrap_err().error(),
        Errno::UnauthorizedAction
    );
    assert_eq!(
        fs::ioctl(fd, 0x1234, 0).unwrap_err().error(),
        Errno::UnauthorizedAction
    );
    fs::close(fd).unwrap();
    fs::unregister_driver("/gated/leaf").unwrap();
}
