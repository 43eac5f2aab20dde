//! Per-tick hook pipeline.
//!
//! A `Stage` holds an ordered list of hooks, each carrying two independent
//! properties: a `HookKind` (documents how the hook expects to be invoked --
//! one-shot, parallel-for, or pinned to the main/orchestrator thread) and a
//! `chaining` flag (whether it joins the stage's sequential chain or its
//! parallel fan-out set). Chained hooks run one after another, each seeing
//! every earlier chained hook's writes; fan-out hooks run concurrently with
//! the chain and with each other, so a fan-out hook must never read or write
//! anything a sibling hook (chained or not) touches. That disjointness is a
//! contract the caller upholds when registering hooks -- the stage has no
//! way to check it, the same way `entity.sectors_mut()` can't check that two
//! hooks agree to stay out of each other's sectors.
//!
//! A `Stage` is driven by the orchestrator explicitly, once per tick, and
//! its hook list locks after the first `run()` so a tick can't silently
//! change shape mid-simulation. After every stage has run, the orchestrator
//! calls [`run_end_of_tick`] once to clear each sector's transient per-tick
//! state.

use crate::error::VoxelResult;
use crate::sector::Sector;

/// How a hook expects to be invoked, independent of its chaining behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    OneShot,
    ParallelFor,
    /// Runs inline on the calling (orchestrator) thread rather than being
    /// handed to a worker, regardless of `chaining`.
    MainThread,
}

type HookFn<TInput> = Box<dyn Fn(&mut TInput) -> VoxelResult<()> + Send + Sync>;

struct HookEntry<TInput> {
    name: &'static str,
    kind: HookKind,
    chaining: bool,
    f: HookFn<TInput>,
}

fn run_and_log<TInput>(entry: &HookEntry<TInput>, input: &mut TInput, stage_name: &'static str) {
    if let Err(err) = (entry.f)(input) {
        tracing::warn!(
            stage = stage_name,
            hook = entry.name,
            kind = ?entry.kind,
            chaining = entry.chaining,
            error = %err,
            "tick hook failed; skipping"
        );
    }
}

/// A raw pointer wrapper asserting it's safe to hand the pointee to multiple
/// threads at once. Sound only because `Stage::run` upholds the hook
/// disjointness contract documented on the module: every fan-out hook's read
/// and write set is disjoint from every other concurrently-running hook's.
/// The stage itself does not and cannot verify this.
#[derive(Clone, Copy)]
struct SyncMutPtr<T>(*mut T);
unsafe impl<T> Send for SyncMutPtr<T> {}
unsafe impl<T> Sync for SyncMutPtr<T> {}

/// An ordered list of hooks run against the same `&mut TInput` once per
/// tick. Locks against further registration after the first [`run`](Self::run).
pub struct Stage<TInput> {
    name: &'static str,
    hooks: Vec<HookEntry<TInput>>,
    locked: bool,
}

impl<TInput> Stage<TInput> {
    pub fn new(name: &'static str) -> Self {
        Self { name, hooks: Vec::new(), locked: false }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Append a hook to the end of the stage's schedule. `chaining` selects
    /// which dependency set the hook joins: `true` to run in sequence after
    /// the previous chaining hook (or at stage start if it's the first),
    /// `false` to run concurrently with the chain and every other
    /// non-chaining hook, off the stage's start dependency alone.
    ///
    /// # Panics
    /// Panics if the stage has already run once -- hook composition is a
    /// setup-time concern, not a per-tick one.
    pub fn add_hook(
        &mut self,
        name: &'static str,
        kind: HookKind,
        chaining: bool,
        f: impl Fn(&mut TInput) -> VoxelResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        assert!(
            !self.locked,
            "stage '{}' is locked: cannot add hook '{name}' after run() has started",
            self.name
        );
        self.hooks.push(HookEntry { name, kind, chaining, f: Box::new(f) });
        self
    }

    /// Run every registered hook against `input` and lock the stage.
    ///
    /// Chaining hooks run sequentially, in registration order, each
    /// observing every earlier chaining hook's writes. Non-chaining hooks
    /// run concurrently with the chain and with each other, observing only
    /// the state `input` was in when `run` was called. A hook returning
    /// `Err` is logged via `tracing::warn!` and skipped; it never aborts
    /// sibling hooks or propagates out of `run`.
    pub fn run(&mut self, input: &mut TInput)
    where
        TInput: Send,
    {
        self.locked = true;
        let name = self.name;

        let (chain, rest): (Vec<&HookEntry<TInput>>, Vec<&HookEntry<TInput>>) =
            self.hooks.iter().partition(|h| h.chaining);
        let (main_thread, fan_out): (Vec<&HookEntry<TInput>>, Vec<&HookEntry<TInput>>) =
            rest.into_iter().partition(|h| h.kind == HookKind::MainThread);

        // Main-thread, non-chaining hooks run inline before the fan-out
        // starts: they depend only on stage start, same as the fan-out set,
        // but must never leave the calling thread.
        for entry in &main_thread {
            run_and_log(entry, input, name);
        }

        if chain.is_empty() && fan_out.is_empty() {
            return;
        }

        let ptr = SyncMutPtr(input as *mut TInput);
        rayon::scope(|scope| {
            if !chain.is_empty() {
                scope.spawn(move |_| {
                    let input = unsafe { &mut *ptr.0 };
                    for entry in &chain {
                        run_and_log(entry, input, name);
                    }
                });
            }
            for entry in &fan_out {
                scope.spawn(move |_| {
                    let input = unsafe { &mut *ptr.0 };
                    run_and_log(entry, input, name);
                });
            }
        });
    }
}

/// Implemented by whatever a stage's `TInput` aggregates, so the pipeline's
/// end-of-tick pass can reach every sector without knowing the aggregate's
/// concrete shape.
pub trait HasSectors {
    fn for_each_sector_mut(&mut self, f: &mut dyn FnMut(&mut Sector));
}

impl HasSectors for crate::entity::VoxelEntity {
    fn for_each_sector_mut(&mut self, f: &mut dyn FnMut(&mut Sector)) {
        for sector in self.sectors_mut() {
            f(sector);
        }
    }
}

/// The pipeline's terminal per-tick hook: iterates every sector and calls
/// [`Sector::end_tick`]. Runs once per tick, after every stage has finished
/// (and after all of a stage's outstanding hook handles have completed),
/// never mid-stage.
pub fn run_end_of_tick<TInput: HasSectors>(input: &mut TInput) {
    input.for_each_sector_mut(&mut |sector| sector.end_tick());
}

/// Knobs for the orchestrator's overall tick cadence. Kept separate from
/// any one [`Stage`] since it governs the driver loop, not hook dispatch.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Upper bound on sectors processed by a single dirty-propagation pass;
    /// mirrors `Scheduler::max_events_per_step`'s role of bounding one
    /// step's batch size rather than draining an unbounded frontier.
    pub max_sectors_per_propagation_pass: usize,
    /// Dirty-flag bits considered by the propagation stage each tick.
    pub propagation_mask: crate::dirty_flags::DirtyFlags,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_sectors_per_propagation_pass: 10_000,
            propagation_mask: crate::dirty_flags::DirtyFlags::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::entity::{EntityGuid, VoxelEntity};
    use crate::math::IVec3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn chained_hooks_run_in_registration_order() {
        let mut stage: Stage<Vec<u32>> = Stage::new("test");
        stage.add_hook("push_1", HookKind::OneShot, true, |v| {
            v.push(1);
            Ok(())
        });
        stage.add_hook("push_2", HookKind::OneShot, true, |v| {
            v.push(2);
            Ok(())
        });

        let mut data = Vec::new();
        stage.run(&mut data);
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn fan_out_hooks_all_run_without_clobbering_each_other() {
        // Each hook touches a disjoint index, satisfying the disjoint
        // write-set contract fan-out concurrency relies on.
        let mut stage: Stage<Mutex<[u32; 3]>> = Stage::new("test");
        for i in 0..3 {
            stage.add_hook("write", HookKind::ParallelFor, false, move |slots: &mut Mutex<[u32; 3]>| {
                slots.lock().unwrap()[i] = (i as u32) + 1;
                Ok(())
            });
        }

        let data = Mutex::new([0u32; 3]);
        let mut cell = data;
        stage.run(&mut cell);
        assert_eq!(cell.into_inner().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn main_thread_hook_runs_inline_alongside_chain() {
        let mut stage: Stage<Vec<u32>> = Stage::new("test");
        stage.add_hook("chained", HookKind::OneShot, true, |v| {
            v.push(1);
            Ok(())
        });
        stage.add_hook("main", HookKind::MainThread, false, |v| {
            v.push(2);
            Ok(())
        });

        let mut data = Vec::new();
        stage.run(&mut data);
        assert_eq!(data.len(), 2);
        assert!(data.contains(&1));
        assert!(data.contains(&2));
    }

    #[test]
    fn failing_hook_is_skipped_not_fatal() {
        let mut stage: Stage<Vec<u32>> = Stage::new("test");
        stage.add_hook("bad", HookKind::OneShot, true, |_| Err(crate::error::VoxelError::NotFound));
        stage.add_hook("good", HookKind::OneShot, true, |v| {
            v.push(42);
            Ok(())
        });

        let mut data = Vec::new();
        stage.run(&mut data);
        assert_eq!(data, vec![42]);
    }

    #[test]
    #[should_panic(expected = "locked")]
    fn adding_a_hook_after_run_panics() {
        let mut stage: Stage<Vec<u32>> = Stage::new("test");
        stage.add_hook("first", HookKind::OneShot, true, |_| Ok(()));
        let mut data = Vec::new();
        stage.run(&mut data);
        stage.add_hook("too_late", HookKind::OneShot, true, |_| Ok(()));
    }

    #[test]
    fn run_is_idempotent_about_locking() {
        let mut stage: Stage<Vec<u32>> = Stage::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        stage.add_hook("count", HookKind::OneShot, true, move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut data = Vec::new();
        stage.run(&mut data);
        stage.run(&mut data);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(stage.is_locked());
    }

    #[test]
    fn end_of_tick_clears_every_sector_transient_state() {
        let mut entity = VoxelEntity::new(EntityGuid(1));
        entity.set_block(IVec3::new(0, 0, 0), Block::from_id_meta(1, 0), None);
        entity.set_block(IVec3::new(200, 0, 0), Block::from_id_meta(2, 0), None);
        assert!(entity.sectors().any(|(_, s)| !s.sector_dirty_flags().is_empty()));

        run_end_of_tick(&mut entity);

        assert!(entity.sectors().all(|(_, s)| s.sector_dirty_flags().is_empty()));
    }
}
