//! Load tracking: active executions per worker.
//!
//! A [`LoadSnapshot`] is computed fresh on every call and never cached.
//! Every worker handed in appears in the snapshot, with zero when nothing
//! matched, so a missing entry never stands for "idle".

use futures::future::try_join_all;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use fleet_core::{ExecFilter, Runtime, RuntimeResult, Worker, WorkerId};

/// Point-in-time execution count per worker, in worker enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSnapshot {
    entries: Vec<(WorkerId, u32)>,
}

impl LoadSnapshot {
    /// A snapshot with every worker at zero load.
    pub fn seeded<'a>(ids: impl IntoIterator<Item = &'a WorkerId>) -> Self {
        Self {
            entries: ids.into_iter().map(|id| (id.clone(), 0)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(worker, _)| worker == id)
            .map(|(_, load)| *load)
    }

    pub fn total(&self) -> u32 {
        self.entries.iter().map(|(_, load)| load).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(id, load)| (id.as_str(), *load))
    }

    pub fn max_load(&self) -> Option<u32> {
        self.entries.iter().map(|(_, load)| *load).max()
    }

    /// Every worker sharing the lowest load.
    pub fn minimum_candidates(&self) -> Vec<&WorkerId> {
        let Some(min) = self.entries.iter().map(|(_, load)| *load).min() else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|(_, load)| *load == min)
            .map(|(id, _)| id)
            .collect()
    }

    /// Pick a least-loaded worker, uniformly at random among ties.
    pub fn pick_minimum<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&WorkerId> {
        self.minimum_candidates().choose(rng).copied()
    }

    /// Like [`pick_minimum`](Self::pick_minimum), but also drops the chosen
    /// worker so repeated calls never return it twice.
    pub fn take_minimum<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<WorkerId> {
        let chosen = self.pick_minimum(rng)?.clone();
        self.entries.retain(|(id, _)| *id != chosen);
        Some(chosen)
    }

    fn set(&mut self, id: &str, load: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|(worker, _)| worker == id) {
            entry.1 = load;
        }
    }
}

impl FromIterator<(WorkerId, u32)> for LoadSnapshot {
    fn from_iter<I: IntoIterator<Item = (WorkerId, u32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Count matching executions on each worker.
///
/// Workers are inspected concurrently, then each worker's executions are
/// inspected concurrently. A worker or execution that disappears during the
/// pass counts as no load.
pub async fn exec_load(
    runtime: &dyn Runtime,
    workers: &[Worker],
    filter: &ExecFilter,
) -> RuntimeResult<LoadSnapshot> {
    let mut snapshot = LoadSnapshot::seeded(workers.iter().map(|w| &w.id));

    let counts = try_join_all(workers.iter().map(|worker| async move {
        let inspect = match runtime.inspect_worker(&worker.id).await {
            Ok(inspect) => inspect,
            Err(e) if e.is_not_found() => {
                debug!(worker = %worker.id, "worker vanished during load pass");
                return Ok((&worker.id, 0));
            }
            Err(e) => return Err(e),
        };

        let matched = try_join_all(inspect.exec_ids.iter().map(|exec_id| async move {
            match runtime.inspect_execution(exec_id).await {
                Ok(exec) => Ok(filter(&exec)),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        }))
        .await?;

        Ok((&worker.id, matched.into_iter().filter(|m| *m).count() as u32))
    }))
    .await?;

    for (id, load) in counts {
        snapshot.set(id, load);
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn snapshot(loads: &[(&str, u32)]) -> LoadSnapshot {
        loads.iter().map(|(id, l)| (id.to_string(), *l)).collect()
    }

    #[test]
    fn seeded_snapshot_has_every_worker_at_zero() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let snap = LoadSnapshot::seeded(&ids);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("a"), Some(0));
        assert_eq!(snap.get("b"), Some(0));
        assert_eq!(snap.get("c"), None);
        assert_eq!(snap.total(), 0);
    }

    #[test]
    fn totals_and_maximum() {
        let snap = snapshot(&[("a", 3), ("b", 0), ("c", 5)]);
        assert_eq!(snap.total(), 8);
        assert_eq!(snap.max_load(), Some(5));
        assert!(LoadSnapshot::default().max_load().is_none());
    }

    #[test]
    fn minimum_candidates_include_every_tie() {
        let snap = snapshot(&[("a", 2), ("b", 1), ("c", 1), ("d", 4)]);
        let candidates: Vec<&str> = snap.minimum_candidates().iter().map(|s| s.as_str()).collect();
        assert_eq!(candidates, vec!["b", "c"]);
        assert!(LoadSnapshot::default().minimum_candidates().is_empty());
    }

    #[test]
    fn pick_minimum_never_picks_a_busier_worker() {
        let snap = snapshot(&[("a", 2), ("b", 0), ("c", 1)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(snap.pick_minimum(&mut rng).unwrap(), "b");
        }
    }

    #[test]
    fn pick_minimum_spreads_over_all_ties() {
        let snap = snapshot(&[("a", 0), ("b", 0), ("c", 0), ("d", 3)]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen: HashMap<String, u32> = HashMap::new();
        for _ in 0..3000 {
            *seen.entry(snap.pick_minimum(&mut rng).unwrap().clone()).or_default() += 1;
        }
        assert!(!seen.contains_key("d"));
        for id in ["a", "b", "c"] {
            let n = seen[id];
            assert!((800..=1200).contains(&n), "{id} picked {n} times");
        }
    }

    #[test]
    fn take_minimum_never_repeats() {
        let mut snap = snapshot(&[("a", 1), ("b", 0), ("c", 0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let first = snap.take_minimum(&mut rng).unwrap();
        let second = snap.take_minimum(&mut rng).unwrap();
        assert_ne!(first, second);
        assert!(["b", "c"].contains(&first.as_str()));
        assert!(["b", "c"].contains(&second.as_str()));
        assert_eq!(snap.take_minimum(&mut rng).unwrap(), "a");
        assert!(snap.take_minimum(&mut rng).is_none());
    }

    mod against_sim {
        use super::super::*;
        use fleet_core::{ExecInspect, FLEET_LABEL, SERVICE_LABEL, WorkerSpec, WorkerState};
        use fleet_sim::SimRuntime;
        use std::time::Duration;

        async fn worker(sim: &SimRuntime, name: &str) -> Worker {
            let mut spec = WorkerSpec::default();
            spec.labels.insert(FLEET_LABEL.into(), "f".into());
            spec.labels.insert(SERVICE_LABEL.into(), "a".into());
            let summary = sim.create_worker(name, &spec).await.unwrap();
            Worker::from_summary(summary, WorkerState::Running).unwrap()
        }

        fn sleep(secs: u32) -> Vec<String> {
            vec!["sleep".into(), secs.to_string()]
        }

        #[tokio::test(start_paused = true)]
        async fn counts_running_executions() {
            let sim = SimRuntime::default();
            let a = worker(&sim, "a").await;
            let b = worker(&sim, "b").await;
            sim.start_execution(&a.id, &sleep(10)).await.unwrap();
            sim.start_execution(&a.id, &sleep(1)).await.unwrap();

            let snap = exec_load(&sim, &[a.clone(), b.clone()], &fleet_core::exec_is_running)
                .await
                .unwrap();
            assert_eq!(snap.get(&a.id), Some(2));
            assert_eq!(snap.get(&b.id), Some(0));

            tokio::time::advance(Duration::from_secs(2)).await;
            let snap = exec_load(&sim, &[a.clone(), b], &fleet_core::exec_is_running)
                .await
                .unwrap();
            assert_eq!(snap.get(&a.id), Some(1));
            assert_eq!(snap.total(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn custom_filter_counts_finished_executions() {
            let sim = SimRuntime::default();
            let a = worker(&sim, "a").await;
            sim.start_execution(&a.id, &sleep(1)).await.unwrap();
            sim.start_execution(&a.id, &sleep(5)).await.unwrap();
            tokio::time::advance(Duration::from_secs(2)).await;

            let finished = |exec: &ExecInspect| exec.exit_code == Some(0);
            let snap = exec_load(&sim, std::slice::from_ref(&a), &finished).await.unwrap();
            assert_eq!(snap.get(&a.id), Some(1));
        }

        #[tokio::test]
        async fn vanished_worker_counts_as_idle() {
            let sim = SimRuntime::default();
            let a = worker(&sim, "a").await;
            sim.start_execution(&a.id, &sleep(10)).await.unwrap();
            sim.kill(&a.id).await;

            let snap = exec_load(&sim, std::slice::from_ref(&a), &fleet_core::exec_is_running)
                .await
                .unwrap();
            assert_eq!(snap.get(&a.id), Some(0));
        }
    }
}
