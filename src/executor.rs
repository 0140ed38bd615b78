// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A completion slot shared between the worker running a job and everyone
/// awaiting it.
pub struct JobHandle<T> {
    slot: Arc<(Mutex<Option<T>>, Condvar)>,
}

impl<T> Clone for JobHandle<T> {
    fn clone(&self) -> JobHandle<T> {
        JobHandle {
            slot: self.slot.clone(),
        }
    }
}

impl<T> JobHandle<T> {
    pub fn new() -> JobHandle<T> {
        JobHandle {
            slot: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    /// An already-completed handle, used when work runs inline.
    pub fn resolved(value: T) -> JobHandle<T> {
        JobHandle {
            slot: Arc::new((Mutex::new(Some(value)), Condvar::new())),
        }
    }

    pub fn complete(&self, value: T) {
        let (lock, cvar) = &*self.slot;
        *lock.lock().unwrap() = Some(value);
        cvar.notify_all();
    }

    pub fn ready(&self) -> bool {
        self.slot.0.lock().unwrap().is_some()
    }

    /// Block until the job completes, then take the result out of the slot.
    /// Only one awaiter may take; further takes would block forever.
    pub fn take(&self) -> T {
        let (lock, cvar) = &*self.slot;
        let mut slot = lock.lock().unwrap();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = cvar.wait(slot).unwrap();
        }
    }
}

impl<T: Clone> JobHandle<T> {
    /// Block until the job completes and clone the result, leaving it in
    /// place for other awaiters.
    pub fn wait_cloned(&self) -> T {
        let (lock, cvar) = &*self.slot;
        let mut slot = lock.lock().unwrap();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = cvar.wait(slot).unwrap();
        }
    }
}

/// A bounded pool of worker threads draining a shared FIFO job queue.
/// Setting the queue to `None` tells the workers to shut down.
pub struct WorkerPool {
    queue: Arc<(Mutex<Option<VecDeque<Job>>>, Condvar)>,
    workers: Vec<JoinHandle<()>>,
}

fn poll_next_job(queue: &(Mutex<Option<VecDeque<Job>>>, Condvar)) -> Option<Job> {
    let (queue_mutex, queue_cvar) = queue;
    let mut queue_locked = queue_mutex.lock().unwrap();

    loop {
        let job_available = match &*queue_locked {
            Some(queue) => !queue.is_empty(),
            None => {
                return None;
            }
        };

        if job_available {
            break;
        }

        queue_locked = queue_cvar.wait(queue_locked).unwrap();
    }

    let queue = queue_locked
        .as_mut()
        .expect("job queue should still exist while the mutex is held after checking it");

    queue.pop_front()
}

fn run_worker(queue: Arc<(Mutex<Option<VecDeque<Job>>>, Condvar)>) {
    loop {
        match poll_next_job(&queue) {
            Some(job) => job(),
            None => {
                return;
            }
        }
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> WorkerPool {
        let queue = Arc::new((Mutex::new(Some(VecDeque::new())), Condvar::new()));

        let worker_threads = (0..workers.max(1))
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || run_worker(queue))
            })
            .collect();

        WorkerPool {
            queue,
            workers: worker_threads,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, job: Job) {
        let (queue_mutex, queue_cvar) = &*self.queue;
        {
            let mut queue = queue_mutex.lock().unwrap();
            if let Some(queue) = queue.as_mut() {
                queue.push_back(job);
            }
        }
        queue_cvar.notify_one();
    }

    /// Submit a closure and get a handle to its result.
    pub fn submit_with_handle<T, F>(&self, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = JobHandle::new();
        let job_handle = handle.clone();
        self.submit(Box::new(move || {
            job_handle.complete(f());
        }));
        handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let (queue_mutex, queue_cvar) = &*self.queue;
            let mut queue = queue_mutex.lock().unwrap();
            *queue = None;
            queue_cvar.notify_all();
        }

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
