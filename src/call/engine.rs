use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::machine::{CallMachine, MachineChannels};
use super::reconciler::Reconciler;
use super::CallCommand;
use crate::events::{CallEvent, EndReason, EventSender};
use crate::models::ServerFrame;

/// Run the call engine event loop.
/// Owns the call machine and feeds it user commands, relay frames,
/// transport events, finished media acquisitions and the answer timer,
/// one at a time.
pub async fn run_call_engine(
    mut machine: CallMachine,
    channels: MachineChannels,
    mut cmd_rx: mpsc::Receiver<CallCommand>,
    mut frame_rx: mpsc::UnboundedReceiver<ServerFrame>,
    reconciler: Reconciler,
    event_tx: EventSender,
) {
    let MachineChannels {
        mut continuations,
        mut peer_events,
        ..
    } = channels;
    info!("Call engine started for {}", machine.me().user_id);

    loop {
        let deadline = machine.answer_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(CallCommand::Shutdown) | None => {
                        machine.shutdown(EndReason::Ended).await;
                        break;
                    }
                    Some(cmd) => handle_command(&mut machine, cmd).await,
                }
            }
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => reconciler.apply(&mut machine, frame).await,
                    None => {
                        warn!("Lost connection to relay");
                        let _ = event_tx.send(CallEvent::RelayDisconnected);
                        machine
                            .shutdown(EndReason::Failed("relay connection lost".to_string()))
                            .await;
                        break;
                    }
                }
            }
            Some(event) = peer_events.recv() => {
                machine.handle_peer_event(event).await;
            }
            Some(continuation) = continuations.recv() => {
                machine.handle_continuation(continuation).await;
            }
            _ = sleep_until(deadline.map(|(at, _)| at)) => {
                if let Some((_, token)) = deadline {
                    machine.handle_answer_timeout(token).await;
                }
            }
        }
    }

    info!("Call engine stopped");
}

async fn handle_command(machine: &mut CallMachine, cmd: CallCommand) {
    match cmd {
        CallCommand::CallUser {
            target,
            is_video,
            reply,
        } => {
            let _ = reply.send(machine.call_user(target, is_video).await);
        }
        CallCommand::AnswerCall { reply } => {
            let _ = reply.send(machine.answer_call().await);
        }
        CallCommand::RejectCall { reply } => {
            let _ = reply.send(machine.reject_call().await);
        }
        CallCommand::EndCall { reply } => {
            let _ = reply.send(machine.end_call().await);
        }
        CallCommand::ToggleMute { reply } => {
            let _ = reply.send(machine.toggle_mute());
        }
        CallCommand::ToggleCamera { reply } => {
            let _ = reply.send(machine.toggle_camera());
        }
        CallCommand::Shutdown => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
