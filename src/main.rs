//! Host binary — hands-free voice conversation from the terminal.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the transcription, completion and synthesis adapters.
//! 5. Spawn the [`TurnController`] with the microphone as its input.
//! 6. Print streamed reply text as it arrives; read terminal commands
//!    (`Enter` = end of speech, `q` = quit).

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use voice_chat::{
    audio::{AudioInput, CommandPlayer, MicrophoneInput},
    config::AppConfig,
    llm::{ApiCompletion, ConversationHistory},
    pipeline::{PipelineOrchestrator, TurnCommand, TurnController, TurnEvent},
    stt::ApiTranscriber,
    tts,
};

// ---------------------------------------------------------------------------
// Terminal output
// ---------------------------------------------------------------------------

async fn print_events(mut events: mpsc::UnboundedReceiver<TurnEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            TurnEvent::Transcript(text) => println!("\nあなた: {text}"),
            TurnEvent::Partial(text) => {
                print!("{text}");
                let _ = stdout.flush();
            }
            TurnEvent::Completed(_) => println!(),
            TurnEvent::Cancelled => println!(" [中断]"),
            TurnEvent::Error(e) => eprintln!("\nエラー: {e}"),
            TurnEvent::NoSpeech | TurnEvent::Stage(_) => {}
        }
    }
}

/// Forward terminal lines as controller commands until `q` or EOF.
async fn read_commands(commands: mpsc::Sender<TurnCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = match line.trim() {
            "" => TurnCommand::ForceEndOfSpeech,
            "s" | "stop" => TurnCommand::Stop,
            "l" | "listen" => TurnCommand::StartListening,
            "q" | "quit" => break,
            other => {
                eprintln!("unknown command {other:?} (Enter, s, l, q)");
                continue;
            }
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice chat starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    config.validate().context("invalid configuration")?;

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 4. Collaborators
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(ApiTranscriber::from_config(&config.stt)?),
            Arc::new(ApiCompletion::from_config(&config.llm)?),
            Arc::from(tts::from_config(&config.tts)?),
            Arc::new(CommandPlayer::from_config(&config.playback)?),
            ConversationHistory::new(),
        )
        .with_config(&config);
        let perf = Arc::clone(orchestrator.perf());

        // 5. Controller
        let mic: Arc<dyn AudioInput> = Arc::new(MicrophoneInput::new(config.audio.input_device.clone()));
        let mut controller = TurnController::new(Arc::new(orchestrator), &config);
        let events = controller.subscribe();
        let (command_tx, command_rx) = mpsc::channel(8);
        let controller_task = tokio::spawn(controller.run(mic, command_rx));
        tokio::spawn(print_events(events));

        command_tx
            .send(TurnCommand::StartListening)
            .await
            .context("controller exited early")?;
        println!("話しかけてください (Enter = 話し終わり, q = 終了)");

        // 6. Terminal commands; dropping the sender shuts the controller down.
        read_commands(command_tx).await;
        controller_task.await.context("controller task failed")?;

        perf.log_summary();
        Ok::<(), anyhow::Error>(())
    })
}
