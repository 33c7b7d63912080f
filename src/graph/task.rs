//! Background layout task bound to the lifetime of its handle.
//!
//! The simulation ticks on a tokio interval and publishes a snapshot after
//! every tick through a watch channel. Callers steer it with
//! pause / resume / drag / release and end it with [`LayoutHandle::stop`].
//! Dropping the handle closes the command channel, which also ends the task.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::layout::{ForceSimulation, LayoutParams, NodePosition, DRAG_ALPHA_TARGET};
use super::RelationGraph;
use crate::error::{MindOrbitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutState {
    Running,
    Paused,
    /// Cooled down; ticking resumes on the next drag.
    Settled,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub tick: u64,
    pub alpha: f64,
    pub state: LayoutState,
    pub positions: Vec<NodePosition>,
}

#[derive(Debug)]
enum LayoutCommand {
    Pause,
    Resume,
    Stop,
    Drag { id: String, x: f64, y: f64 },
    Release { id: String },
}

/// Owner of a running layout task.
pub struct LayoutHandle {
    commands: mpsc::UnboundedSender<LayoutCommand>,
    snapshots: watch::Receiver<LayoutSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl LayoutHandle {
    /// Spawn the layout task on the current tokio runtime.
    pub fn start(graph: &RelationGraph, params: LayoutParams, tick_interval: Duration) -> Self {
        let sim = ForceSimulation::new(graph, params);
        let initial = LayoutSnapshot {
            tick: 0,
            alpha: sim.alpha(),
            state: initial_state(&sim),
            positions: sim.positions(),
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snap_tx, snap_rx) = watch::channel(initial);

        log::debug!(
            "Starting layout task: {} nodes, {} edges, tick every {:?}",
            graph.nodes.len(),
            graph.edges.len(),
            tick_interval
        );

        let task = tokio::spawn(run_layout(sim, cmd_rx, snap_tx, tick_interval));

        Self {
            commands: cmd_tx,
            snapshots: snap_rx,
            task: Some(task),
        }
    }

    pub fn pause(&self) -> Result<()> {
        self.send(LayoutCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(LayoutCommand::Resume)
    }

    /// Pin a node under the pointer and keep the simulation warm.
    pub fn drag(&self, id: &str, x: f64, y: f64) -> Result<()> {
        self.send(LayoutCommand::Drag {
            id: id.to_string(),
            x,
            y,
        })
    }

    /// Unpin a dragged node and let the simulation cool again.
    pub fn release(&self, id: &str) -> Result<()> {
        self.send(LayoutCommand::Release { id: id.to_string() })
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> LayoutSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LayoutSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop ticking, wait for the task to exit and return the final snapshot.
    pub async fn stop(mut self) -> Result<LayoutSnapshot> {
        if let Some(task) = self.task.take() {
            // The task may already be gone; joining still reports how it ended.
            let _ = self.commands.send(LayoutCommand::Stop);
            task.await
                .map_err(|e| MindOrbitError::Layout(format!("layout task failed: {}", e)))?;
        }
        Ok(self.snapshot())
    }

    fn send(&self, command: LayoutCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MindOrbitError::Layout("layout task has stopped".to_string()))
    }
}

impl Drop for LayoutHandle {
    fn drop(&mut self) {
        if self.task.take().is_some() {
            let _ = self.commands.send(LayoutCommand::Stop);
        }
    }
}

fn initial_state(sim: &ForceSimulation) -> LayoutState {
    if sim.node_count() == 0 {
        LayoutState::Settled
    } else {
        LayoutState::Running
    }
}

fn publish(snapshots: &watch::Sender<LayoutSnapshot>, sim: &ForceSimulation, state: LayoutState) {
    snapshots.send_replace(LayoutSnapshot {
        tick: sim.ticks(),
        alpha: sim.alpha(),
        state,
        positions: sim.positions(),
    });
}

async fn run_layout(
    mut sim: ForceSimulation,
    mut commands: mpsc::UnboundedReceiver<LayoutCommand>,
    snapshots: watch::Sender<LayoutSnapshot>,
    tick_interval: Duration,
) {
    let mut state = initial_state(&sim);
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    None | Some(LayoutCommand::Stop) => break,
                    Some(LayoutCommand::Pause) => {
                        if state == LayoutState::Running {
                            state = LayoutState::Paused;
                        }
                    }
                    Some(LayoutCommand::Resume) => {
                        if state == LayoutState::Paused {
                            state = if sim.is_settled() {
                                LayoutState::Settled
                            } else {
                                LayoutState::Running
                            };
                        }
                    }
                    Some(LayoutCommand::Drag { id, x, y }) => match sim.pin(&id, x, y) {
                        Ok(()) => {
                            sim.set_alpha_target(DRAG_ALPHA_TARGET);
                            if state == LayoutState::Settled {
                                state = LayoutState::Running;
                            }
                        }
                        Err(e) => log::warn!("Ignoring drag: {}", e),
                    },
                    Some(LayoutCommand::Release { id }) => {
                        if let Err(e) = sim.unpin(&id) {
                            log::warn!("Ignoring release: {}", e);
                        }
                        sim.set_alpha_target(0.0);
                    }
                }
                publish(&snapshots, &sim, state);
            }
            _ = interval.tick(), if state == LayoutState::Running => {
                sim.tick();
                if sim.is_settled() {
                    log::debug!("Layout settled after {} ticks", sim.ticks());
                    state = LayoutState::Settled;
                }
                publish(&snapshots, &sim, state);
            }
        }
    }

    publish(&snapshots, &sim, LayoutState::Stopped);
    log::debug!("Layout task stopped at tick {}", sim.ticks());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::models::{ItemType, KnowledgeItem};

    const WAIT: Duration = Duration::from_secs(10);

    fn graph(n: usize) -> RelationGraph {
        let items: Vec<_> = (0..n)
            .map(|i| KnowledgeItem {
                id: format!("n{}", i),
                item_type: ItemType::Text,
                content: String::new(),
                title: format!("Node {}", i),
                summary: String::new(),
                tags: vec![],
                category: if i % 2 == 0 { "Art" } else { "Science" }.to_string(),
                created_at: 0,
            })
            .collect();
        build_graph(&items)
    }

    fn start(n: usize) -> LayoutHandle {
        LayoutHandle::start(&graph(n), LayoutParams::default(), Duration::from_millis(1))
    }

    async fn wait_until(
        rx: &mut watch::Receiver<LayoutSnapshot>,
        f: impl FnMut(&LayoutSnapshot) -> bool,
    ) -> LayoutSnapshot {
        tokio::time::timeout(WAIT, rx.wait_for(f))
            .await
            .expect("timed out waiting for layout")
            .expect("layout channel closed")
            .clone()
    }

    #[tokio::test]
    async fn test_runs_until_settled() {
        let handle = start(4);
        let mut rx = handle.subscribe();
        let snap = wait_until(&mut rx, |s| s.state == LayoutState::Settled).await;
        assert!(snap.tick >= 290);
        assert!(snap.alpha < 0.001);
        assert_eq!(snap.positions.len(), 4);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_graph_starts_settled() {
        let handle = start(0);
        assert_eq!(handle.snapshot().state, LayoutState::Settled);
        assert!(handle.snapshot().positions.is_empty());
        let last = handle.stop().await.unwrap();
        assert_eq!(last.state, LayoutState::Stopped);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let handle = start(6);
        let mut rx = handle.subscribe();
        handle.pause().unwrap();
        let paused = wait_until(&mut rx, |s| s.state == LayoutState::Paused).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.snapshot().tick, paused.tick);

        handle.resume().unwrap();
        wait_until(&mut rx, |s| s.tick > paused.tick).await;
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let handle = start(3);
        let rx = handle.subscribe();
        let last = handle.stop().await.unwrap();
        assert_eq!(last.state, LayoutState::Stopped);
        assert_eq!(rx.borrow().state, LayoutState::Stopped);
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let handle = start(3);
        let mut rx = handle.subscribe();
        drop(handle);

        let stopped = tokio::time::timeout(WAIT, async {
            loop {
                if rx.borrow_and_update().state == LayoutState::Stopped {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return rx.borrow().state == LayoutState::Stopped;
                }
            }
        })
        .await
        .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_drag_wakes_settled_layout() {
        let handle = start(3);
        let mut rx = handle.subscribe();
        let settled = wait_until(&mut rx, |s| s.state == LayoutState::Settled).await;

        handle.drag("n1", 10.0, 20.0).unwrap();
        let dragged = wait_until(&mut rx, |s| {
            s.tick > settled.tick
                && s.positions.iter().any(|p| p.id == "n1" && p.x == 10.0 && p.y == 20.0)
        })
        .await;
        assert_eq!(dragged.state, LayoutState::Running);

        handle.release("n1").unwrap();
        wait_until(&mut rx, |s| s.state == LayoutState::Settled).await;
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_after_stop_fail() {
        let handle = start(2);
        let commands = handle.commands.clone();
        handle.stop().await.unwrap();
        assert!(commands.send(LayoutCommand::Pause).is_err());
    }
}
