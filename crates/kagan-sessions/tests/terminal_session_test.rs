use std::time::Duration;

use kagan_sessions::pty_pool::{PtyError, PtyPool};
use uuid::Uuid;

// ===========================================================================
// PTY Session
// ===========================================================================

#[test]
fn test_pty_spawn_shell() {
    let pool = PtyPool::new(4);
    let shell = if cfg!(target_os = "macos") {
        "/bin/zsh"
    } else {
        "/bin/bash"
    };
    let handle = pool
        .spawn(shell, &[], &[("TERM", "xterm-256color")])
        .expect("failed to spawn shell");

    assert!(
        handle.is_alive(),
        "shell process should be alive after spawn"
    );
    assert_eq!(pool.active_count(), 1);

    // Clean up.
    let _ = handle.kill();
}

#[test]
fn test_pty_write_and_read_output() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn("/bin/sh", &["-c", "cat"], &[])
        .expect("failed to spawn cat");

    // Send input to cat (which echoes it back).
    handle
        .send_line("pty_write_test_data")
        .expect("send_line failed");

    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(
        text.contains("pty_write_test_data"),
        "expected to read back 'pty_write_test_data', got: {text:?}"
    );

    let _ = handle.kill();
}

#[test]
fn test_pty_resize() {
    // PTY resize is handled at the portable-pty level. We verify that
    // spawning with default size works and the process stays alive.
    let pool = PtyPool::new(4);
    let handle = pool.spawn("/bin/cat", &[], &[]).expect("failed to spawn");

    // The handle should be alive (resize is a PTY master operation).
    assert!(handle.is_alive());

    // Clean up.
    let _ = handle.kill();
}

#[test]
fn test_pty_kill_process() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn("/bin/cat", &[], &[])
        .expect("failed to spawn cat");

    assert!(handle.is_alive(), "should be alive before kill");

    handle.kill().expect("kill failed");

    // Give the process a moment to terminate.
    std::thread::sleep(Duration::from_millis(200));

    assert!(!handle.is_alive(), "should not be alive after kill");
}

#[test]
fn test_pty_exit_code_capture() {
    let pool = PtyPool::new(4);

    // Spawn a process that exits immediately with a specific code.
    let handle = pool
        .spawn("/bin/sh", &["-c", "exit 0"], &[])
        .expect("failed to spawn");

    // Wait for process to complete.
    std::thread::sleep(Duration::from_millis(500));

    // Process should have exited.
    assert!(
        !handle.is_alive(),
        "process should have exited after 'exit 0'"
    );
}

#[test]
fn test_pty_exit_code_nonzero() {
    let pool = PtyPool::new(4);

    let handle = pool
        .spawn("/bin/sh", &["-c", "exit 42"], &[])
        .expect("failed to spawn");

    std::thread::sleep(Duration::from_millis(500));

    assert!(
        !handle.is_alive(),
        "process should have exited after 'exit 42'"
    );
}

#[test]
fn test_pty_environment_variables() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn(
            "/bin/sh",
            &["-c", "echo MY_TEST_VAR=$MY_TEST_VAR"],
            &[("MY_TEST_VAR", "hello_from_env")],
        )
        .expect("failed to spawn");

    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(
        text.contains("MY_TEST_VAR=hello_from_env"),
        "expected env var in output, got: {text:?}"
    );
}

#[test]
fn test_pty_multiple_env_vars() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn(
            "/bin/sh",
            &["-c", "echo A=$A B=$B C=$C"],
            &[("A", "alpha"), ("B", "beta"), ("C", "gamma")],
        )
        .expect("failed to spawn");

    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("A=alpha"), "missing A=alpha in: {text:?}");
    assert!(text.contains("B=beta"), "missing B=beta in: {text:?}");
    assert!(text.contains("C=gamma"), "missing C=gamma in: {text:?}");
}

// ===========================================================================
// PTY Pool
// ===========================================================================

#[test]
fn test_pool_create_multiple_sessions() {
    let pool = PtyPool::new(4);

    let h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    let h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");
    let h3 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 3");

    assert_eq!(pool.active_count(), 3);

    // All handles should have unique IDs.
    assert_ne!(h1.id, h2.id);
    assert_ne!(h2.id, h3.id);
    assert_ne!(h1.id, h3.id);

    // Clean up.
    let _ = h1.kill();
    let _ = h2.kill();
    let _ = h3.kill();
}

#[test]
fn test_pool_max_capacity() {
    let pool = PtyPool::new(2);

    let _h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    let _h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");

    // Third spawn should fail.
    let result = pool.spawn("/bin/cat", &[], &[]);
    assert!(result.is_err(), "expected capacity error on third spawn");

    match result.unwrap_err() {
        PtyError::AtCapacity { max } => {
            assert_eq!(max, 2, "capacity max should be 2");
        }
        other => panic!("expected AtCapacity error, got: {other:?}"),
    }
}

#[test]
fn test_pool_remove_session() {
    let pool = PtyPool::new(4);

    let h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    let h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");
    assert_eq!(pool.active_count(), 2);

    let h1_id = h1.id;
    h1.kill().expect("kill h1");
    pool.kill(h1_id).expect("remove h1 from pool");

    assert_eq!(pool.active_count(), 1);

    // h2 should still be alive.
    assert!(h2.is_alive());
    let _ = h2.kill();
}

#[test]
fn test_pool_list_active_sessions() {
    let pool = PtyPool::new(4);

    assert_eq!(pool.active_count(), 0);

    let h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    assert_eq!(pool.active_count(), 1);

    let h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");
    assert_eq!(pool.active_count(), 2);

    let h1_id = h1.id;
    let _ = h1.kill();
    pool.kill(h1_id).expect("remove from pool");
    assert_eq!(pool.active_count(), 1);

    let h2_id = h2.id;
    let _ = h2.kill();
    pool.kill(h2_id).expect("remove from pool");
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_pool_session_isolation() {
    let pool = PtyPool::new(4);

    let h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    let h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");

    // Write to h1 only.
    h1.send_line("ISOLATION_SESSION_1").expect("send to h1");

    std::thread::sleep(Duration::from_millis(500));

    // h1 should contain the marker.
    let out1 = h1.try_read_all();
    let text1 = String::from_utf8_lossy(&out1);
    assert!(
        text1.contains("ISOLATION_SESSION_1"),
        "h1 should contain marker, got: {text1:?}"
    );

    // h2 should NOT contain the marker.
    let out2 = h2.try_read_all();
    let text2 = String::from_utf8_lossy(&out2);
    assert!(
        !text2.contains("ISOLATION_SESSION_1"),
        "h2 should NOT contain h1's marker, got: {text2:?}"
    );

    let _ = h1.kill();
    let _ = h2.kill();
}

#[test]
fn test_pool_release_frees_slot() {
    let pool = PtyPool::new(2);

    let h1 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 1");
    let _h2 = pool.spawn("/bin/cat", &[], &[]).expect("spawn 2");
    assert_eq!(pool.active_count(), 2);

    // Release h1 (without kill — simulates process that already exited).
    let h1_id = h1.id;
    pool.release(h1_id);
    assert_eq!(pool.active_count(), 1);

    // Should now be able to spawn a third.
    let _h3 = pool
        .spawn("/bin/cat", &[], &[])
        .expect("spawn 3 after release");
    assert_eq!(pool.active_count(), 2);
}

#[test]
fn test_pool_kill_nonexistent_returns_error() {
    let pool = PtyPool::new(4);
    let bogus = Uuid::new_v4();

    let result = pool.kill(bogus);
    assert!(result.is_err());
    match result.unwrap_err() {
        PtyError::HandleNotFound(id) => assert_eq!(id, bogus),
        other => panic!("expected HandleNotFound, got: {other:?}"),
    }
}

// ===========================================================================
// Worktree Integration
// ===========================================================================

#[test]
fn test_terminal_spawns_in_worktree_dir() {
    let pool = PtyPool::new(4);

    // Spawn a shell that prints its working directory.
    // We pass a PWD env var to simulate worktree directory.
    let handle = pool
        .spawn("/bin/sh", &["-c", "echo CWD_IS=$(pwd)"], &[("PWD", "/tmp")])
        .expect("failed to spawn");

    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);

    // The shell should report some directory. The PWD env is set, but the
    // actual cwd depends on the spawn implementation. We verify the env
    // var was at least passed.
    assert!(!text.is_empty(), "expected some output from pwd command");
}

#[test]
fn test_terminal_env_includes_worktree_path() {
    let pool = PtyPool::new(4);

    let worktree_path = "/tmp/test-worktree-path";
    let handle = pool
        .spawn(
            "/bin/sh",
            &["-c", "echo WORKTREE=$WORKTREE_PATH"],
            &[("WORKTREE_PATH", worktree_path)],
        )
        .expect("failed to spawn");

    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(
        text.contains(&format!("WORKTREE={worktree_path}")),
        "expected WORKTREE_PATH env in output, got: {text:?}"
    );
}

// ===========================================================================
// Async PTY tests
// ===========================================================================

#[tokio::test]
async fn test_pty_read_timeout_returns_data() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn("/bin/echo", &["async-session-test"], &[])
        .expect("failed to spawn");

    let data = handle.read_timeout(Duration::from_secs(2)).await;
    assert!(data.is_some(), "expected data from read_timeout");
    let bytes = data.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(
        text.contains("async-session-test"),
        "expected 'async-session-test' in: {text:?}"
    );
}

#[tokio::test]
async fn test_pty_read_timeout_no_data_returns_none() {
    let pool = PtyPool::new(4);
    // Spawn cat which produces no output until we write to it.
    let handle = pool
        .spawn("/bin/cat", &[], &[])
        .expect("failed to spawn cat");

    // Short timeout should return None since cat hasn't received input.
    let data = handle.read_timeout(Duration::from_millis(100)).await;
    // This may or may not be None depending on PTY initial output,
    // but we verify the timeout mechanism doesn't panic.
    drop(data);

    let _ = handle.kill();
}

// ===========================================================================
// PTY Handle send/send_line
// ===========================================================================

#[test]
fn test_pty_send_raw_bytes() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn("/bin/cat", &[], &[])
        .expect("failed to spawn cat");

    handle.send(b"raw_bytes_test\n").expect("send failed");
    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(
        text.contains("raw_bytes_test"),
        "expected raw bytes in output, got: {text:?}"
    );

    let _ = handle.kill();
}

#[test]
fn test_pty_send_line_appends_newline() {
    let pool = PtyPool::new(4);
    let handle = pool
        .spawn("/bin/cat", &[], &[])
        .expect("failed to spawn cat");

    // send_line should append \n automatically.
    handle
        .send_line("line_test_data")
        .expect("send_line failed");
    std::thread::sleep(Duration::from_millis(500));

    let output = handle.try_read_all();
    let text = String::from_utf8_lossy(&output);
    assert!(
        text.contains("line_test_data"),
        "expected line data in output, got: {text:?}"
    );

    let _ = handle.kill();
}

// ===========================================================================
// Debug formatting
// ===========================================================================

#[test]
fn test_pty_handle_debug_format() {
    let pool = PtyPool::new(4);
    let handle = pool.spawn("/bin/cat", &[], &[]).expect("failed to spawn");

    let debug_str = format!("{:?}", handle);
    assert!(
        debug_str.contains("PtyHandle"),
        "debug should contain 'PtyHandle', got: {debug_str}"
    );
    assert!(
        debug_str.contains("alive"),
        "debug should contain 'alive', got: {debug_str}"
    );

    let _ = handle.kill();
}

#[test]
fn test_pty_pool_debug_format() {
    let pool = PtyPool::new(8);
    let debug_str = format!("{:?}", pool);
    assert!(
        debug_str.contains("PtyPool"),
        "debug should contain 'PtyPool', got: {debug_str}"
    );
    assert!(
        debug_str.contains("max_ptys"),
        "debug should contain 'max_ptys', got: {debug_str}"
    );
}

// ===========================================================================
// PtyError variants
// ===========================================================================

#[test]
fn test_pty_error_at_capacity_display() {
    let err = PtyError::AtCapacity { max: 4 };
    let msg = err.to_string();
    assert!(
        msg.contains("capacity") && msg.contains("4"),
        "expected capacity message with 4, got: {msg}"
    );
}

#[test]
fn test_pty_error_handle_not_found_display() {
    let id = Uuid::new_v4();
    let err = PtyError::HandleNotFound(id);
    let msg = err.to_string();
    assert!(
        msg.contains(&id.to_string()),
        "expected UUID in error message, got: {msg}"
    );
}

#[test]
fn test_pty_spawn_nonexistent_binary() {
    let pool = PtyPool::new(4);
    let result = pool.spawn("/nonexistent/binary/path", &[], &[]);
    assert!(result.is_err(), "spawning nonexistent binary should fail");
}
