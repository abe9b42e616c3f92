use rust_tbptt::training::{create_echo_trainer, ExperimentConfig};
use rust_tbptt::viz::TerminalVisualizer;

fn main() {
    let config = ExperimentConfig::default();
    println!(
        "Echo task: {} epochs, {} chunks of length {} per epoch, lag {}",
        config.num_epochs,
        config.num_chunks(),
        config.chunk_length,
        config.echo_lag
    );

    let mut trainer = match create_echo_trainer(config, TerminalVisualizer::new()) {
        Ok(trainer) => trainer,
        Err(err) => {
            eprintln!("invalid experiment configuration: {}", err);
            std::process::exit(1);
        }
    };

    trainer.run();

    let history = trainer.loss_history();
    let tail = &history[history.len() - history.len() / 10..];
    let final_loss = tail.iter().sum::<f64>() / tail.len() as f64;
    println!("Training completed! Mean loss over final 10% of chunks: {:.5}", final_loss);
}
