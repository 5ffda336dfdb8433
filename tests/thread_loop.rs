use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use atomic_refcell::AtomicRefCell;
use smallvec::SmallVec;

use sedge::{
    new_shared_io, AudioFormat, ConvertNode, DataKind, DataPlane, Direction, HostBuffer, IoKind,
    IoStatus, LoopStartError, MediaFormat, Node, Param, ParamKind, SampleFormat, SampleLayout,
    SharedBuffer, ThreadLoop,
};

#[test]
fn rendezvous_hands_a_value_across_threads() {
    let mut tl = ThreadLoop::new("loop-rendezvous");
    tl.start().unwrap();

    let result = Arc::new(AtomicRefCell::new(None::<i32>));
    let result_in_handler = Arc::clone(&result);

    {
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            *result_in_handler.borrow_mut() = Some(21 * 2);
            // Blocks until the waiting thread accepts.
            dispatch.signal(true);
        });
        guard.wait();
        assert_eq!(*result.borrow(), Some(42));
        guard.accept();
    }

    tl.stop();
}

#[test]
fn fire_and_forget_signal_does_not_block_the_worker() {
    let mut tl = ThreadLoop::new("loop-signal");
    tl.start().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));

    {
        let o = Arc::clone(&order);
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            o.lock().unwrap().push("handler");
            dispatch.signal(false);
        });
        guard.wait();
    }

    // A second handler proves the worker kept dispatching after the
    // fire-and-forget signal.
    {
        let o = Arc::clone(&order);
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            o.lock().unwrap().push("after");
            dispatch.signal(true);
        });
        guard.wait();
        guard.accept();
    }

    assert_eq!(*order.lock().unwrap(), vec!["handler", "after"]);
    tl.stop();
}

#[test]
fn tasks_dispatch_in_post_order() {
    let mut tl = ThreadLoop::new("loop-fifo");
    tl.start().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut guard = tl.lock();
    for i in 0..16 {
        let seen = Arc::clone(&seen);
        guard.invoke(move |_| {
            seen.lock().unwrap().push(i);
        });
    }
    let seen_done = Arc::clone(&seen);
    guard.invoke(move |dispatch| {
        seen_done.lock().unwrap().push(99);
        dispatch.signal(true);
    });
    guard.wait();
    guard.accept();
    drop(guard);

    let order = seen.lock().unwrap().clone();
    assert_eq!(order, (0..16).chain(std::iter::once(99)).collect::<Vec<_>>());

    tl.stop();
}

#[test]
fn start_twice_is_rejected() {
    let mut tl = ThreadLoop::new("loop-double-start");
    tl.start().unwrap();
    assert!(matches!(tl.start(), Err(LoopStartError::AlreadyStarted)));
    tl.stop();
}

#[test]
fn restarts_after_stop() {
    let mut tl = ThreadLoop::new("loop-restart");
    tl.start().unwrap();
    tl.stop();

    tl.start().unwrap();
    let ran = Arc::new(Mutex::new(false));
    {
        let ran = Arc::clone(&ran);
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            *ran.lock().unwrap() = true;
            dispatch.signal(true);
        });
        guard.wait();
        guard.accept();
    }
    assert!(*ran.lock().unwrap());
    tl.stop();
}

#[test]
fn worker_thread_identity() {
    let mut tl = ThreadLoop::new("loop-identity");
    tl.start().unwrap();

    // The test thread is not the worker.
    assert!(!tl.in_thread());

    // Handlers run on the named worker thread.
    let name = Arc::new(Mutex::new(None::<String>));
    {
        let name = Arc::clone(&name);
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            *name.lock().unwrap() = thread::current().name().map(String::from);
            dispatch.signal(true);
        });
        guard.wait();
        guard.accept();
    }
    assert_eq!(name.lock().unwrap().as_deref(), Some("loop-identity"));

    tl.stop();
}

#[test]
fn lock_excludes_the_worker_from_dispatch() {
    let mut tl = ThreadLoop::new("loop-exclusion");
    tl.start().unwrap();

    let counter = Arc::new(Mutex::new(0u32));

    let guard = tl.lock();
    {
        let counter = Arc::clone(&counter);
        guard.invoke(move |_| {
            *counter.lock().unwrap() += 1;
        });
    }

    // The worker cannot dispatch while the lock is held elsewhere.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*counter.lock().unwrap(), 0);
    drop(guard);

    // Flush with a rendezvous and observe the handler ran.
    let mut guard = tl.lock();
    guard.invoke(|dispatch| dispatch.signal(true));
    guard.wait();
    guard.accept();
    drop(guard);
    assert_eq!(*counter.lock().unwrap(), 1);

    tl.stop();
}

#[test]
fn dropping_a_running_loop_stops_it() {
    let mut tl = ThreadLoop::new("loop-drop");
    tl.start().unwrap();
    drop(tl);
}

/// The standard hosting pattern: the node lives on the loop, configuration
/// happens under the loop lock, and process ticks run as dispatched tasks.
#[test]
fn drives_a_convert_node_on_the_worker() {
    // Payload storage kept alive for the whole test.
    let mut storage: Vec<Box<[u8]>> = Vec::new();
    let mut alloc = |id: u32, n_planes: usize, capacity: usize| -> SharedBuffer {
        let mut planes: SmallVec<[DataPlane; 2]> = SmallVec::new();
        for _ in 0..n_planes {
            let mut payload = vec![0u8; capacity].into_boxed_slice();
            planes.push(DataPlane {
                kind: DataKind::MemPtr,
                data: payload.as_mut_ptr(),
                max_size: capacity as u32,
                size: 0,
            });
            storage.push(payload);
        }
        Arc::new(AtomicRefCell::new(HostBuffer::new(id, planes)))
    };

    let input = alloc(0, 1, 1024);
    let output = alloc(0, 2, 1024);

    let mut tl = ThreadLoop::new("loop-node");
    tl.start().unwrap();

    let node = Arc::new(AtomicRefCell::new(ConvertNode::new()));
    let in_io = new_shared_io();
    let out_io = new_shared_io();

    // Configure under the loop lock, as a scheduler thread would.
    {
        let guard = tl.lock();
        let mut n = node.borrow_mut();
        let in_format =
            AudioFormat::new(SampleFormat::S16, SampleLayout::Interleaved, 2, 44100);
        let out_format =
            AudioFormat::new(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 44100);
        n.port_set_param(
            Direction::Input,
            0,
            ParamKind::Format,
            Some(&Param::Format(MediaFormat::audio_raw(in_format))),
        )
        .unwrap();
        n.port_set_param(
            Direction::Output,
            0,
            ParamKind::Format,
            Some(&Param::Format(MediaFormat::audio_raw(out_format))),
        )
        .unwrap();
        n.port_set_io(Direction::Input, 0, IoKind::Buffers, Some(Arc::clone(&in_io))).unwrap();
        n.port_set_io(Direction::Output, 0, IoKind::Buffers, Some(Arc::clone(&out_io))).unwrap();
        n.port_use_buffers(Direction::Input, 0, std::slice::from_ref(&input)).unwrap();
        n.port_use_buffers(Direction::Output, 0, std::slice::from_ref(&output)).unwrap();
        drop(n);
        drop(guard);
    }

    // Present one interleaved s16 frame pair and tick on the worker.
    {
        let samples: Vec<u8> =
            [16384i16, -16384i16].iter().flat_map(|s| s.to_ne_bytes()).collect();
        let mut b = input.borrow_mut();
        b.planes[0].bytes_mut()[..4].copy_from_slice(&samples);
        b.planes[0].size = 4;
    }
    in_io.borrow_mut().set_status(IoStatus::HaveBuffer);
    in_io.borrow_mut().buffer_id = 0;

    let status = Arc::new(AtomicRefCell::new(None));
    {
        let node = Arc::clone(&node);
        let status_cell = Arc::clone(&status);
        let mut guard = tl.lock();
        guard.invoke(move |dispatch| {
            *status_cell.borrow_mut() = Some(node.borrow_mut().process());
            dispatch.signal(true);
        });
        guard.wait();
        assert_eq!(*status.borrow(), Some(Ok(IoStatus::HaveBuffer)));
        guard.accept();
    }

    assert_eq!(out_io.borrow().buffer_id, 0);
    let out = output.borrow();
    let left = f32::from_ne_bytes([
        out.planes[0].bytes()[0],
        out.planes[0].bytes()[1],
        out.planes[0].bytes()[2],
        out.planes[0].bytes()[3],
    ]);
    let right = f32::from_ne_bytes([
        out.planes[1].bytes()[0],
        out.planes[1].bytes()[1],
        out.planes[1].bytes()[2],
        out.planes[1].bytes()[3],
    ]);
    assert_eq!(left, 0.5);
    assert_eq!(right, -0.5);
    drop(out);

    tl.stop();
}
