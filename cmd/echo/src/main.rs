//! Pipe echo demo.
//!
//! Spawns two coroutines sharing a pipe: a writer that counts up,
//! encoding each number as a string, and a reader that prints whatever
//! it receives. Both sides sleep between operations, so the exchange is
//! paced rather than a tight spin. The scenario's one-second pacing is
//! scaled down here so the demo finishes in a few seconds; everything
//! else about the exchange is unchanged.

use std::os::unix::io::RawFd;
use std::time::Duration;

use ringrt::Runtime;

const ROUNDS: u32 = 5;
const STEP: Duration = Duration::from_millis(200);

fn make_pipe() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() failed: {}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

async fn reader_loop(fd: RawFd) {
    let mut buf = [0u8; 1024];
    for _ in 0..ROUNDS {
        match ringrt::io::read(fd, &mut buf).await {
            Ok(n) if n > 0 => {
                let text = String::from_utf8_lossy(&buf[..n as usize]);
                println!("reader: received {:?}", text);
            }
            Ok(_) => break,
            Err(e) => {
                eprintln!("reader: read failed: {e}");
                break;
            }
        }
        ringrt::time::sleep(STEP).await;
    }
    unsafe { libc::close(fd) };
}

async fn writer_loop(fd: RawFd) {
    for n in 1..=ROUNDS {
        let s = n.to_string();
        if let Err(e) = ringrt::io::write(fd, s.as_bytes()).await {
            eprintln!("writer: write failed: {e}");
            break;
        }
        ringrt::time::sleep(STEP).await;
    }
    unsafe { libc::close(fd) };
}

fn main() {
    let rt = Runtime::new().expect("failed to start runtime");

    rt.block_on(async move {
        let (read_fd, write_fd) = make_pipe();

        let reader = ringrt::task::spawn(reader_loop(read_fd))
            .expect("spawn from inside block_on's task must succeed");
        let writer = ringrt::task::spawn(writer_loop(write_fd))
            .expect("spawn from inside block_on's task must succeed");

        let _ = reader.await;
        let _ = writer.await;
    });
}
