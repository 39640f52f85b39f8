use facework_core::networking::transfer::{TransferDirection, TransferEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};
use std::collections::HashMap;
use std::fmt::Write;
use tokio::sync::mpsc::UnboundedReceiver;

/// Draws one progress bar per transfer until the sender side is dropped.
/// Returns the number of transfers that ran to completion.
pub async fn render_transfers(
    multi_pg: MultiProgress,
    mut rx: UnboundedReceiver<TransferEvent>,
) -> usize {
    let mut bars: HashMap<String, (ProgressBar, TransferDirection)> = HashMap::new();
    let mut finished = 0;

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Started {
                file,
                direction,
                total,
            } => {
                let pb = multi_pg.add(build_file_progress_bar(file.clone(), total));
                bars.insert(file, (pb, direction));
            }
            TransferEvent::Progress { file, bytes } => {
                if let Some((pb, _)) = bars.get(&file) {
                    pb.inc(bytes as u64);
                }
            }
            TransferEvent::Finished { file } => {
                if let Some((pb, direction)) = bars.remove(&file) {
                    let verb = match direction {
                        TransferDirection::Upload => "Uploaded",
                        TransferDirection::Download => "Downloaded",
                    };
                    pb.finish_with_message(format!("{verb} {file}"));
                    finished += 1;
                }
            }
        }
    }

    // Transfers that never finished were aborted.
    for (_, (pb, _)) in bars {
        pb.abandon();
    }
    finished
}

fn build_file_progress_bar(file_name: String, total_size: Option<u64>) -> ProgressBar {
    let pb = match total_size {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    match ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(
            style
                .with_key("eta", move |state: &ProgressState, w: &mut dyn Write| {
                    let _ = write!(w, "{}-{:.1}s", file_name, state.eta().as_secs_f64());
                })
                .progress_chars("#>-"),
        ),
        Err(err) => tracing::debug!("default progress style kept: {err}"),
    }
    pb
}
