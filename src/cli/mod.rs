use crate::config::CollisionPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "model-bundler")]
#[command(version, about = "Bundles model and inference code into model.tar.gz", long_about = None)]
pub struct Cli {
	/// Path to a TOML settings file
	#[arg(long, global = true)]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Fetch both archives, merge them with any overrides and write model.tar.gz
	Bundle {
		/// Location of the model archive (http(s) URL, file:// URL or path)
		#[arg(long, env = "MODEL_URL")]
		model_url: String,

		/// Location of the inference code archive
		#[arg(long, env = "MODEL_INFERENCE_CODE_URL")]
		code_url: String,

		/// Input root holding downloads, the build tree and overrides/
		#[arg(long)]
		input_dir: Option<PathBuf>,

		/// Output root receiving model.tar.gz
		#[arg(long)]
		output_dir: Option<PathBuf>,

		/// How to treat a `code` entry already present in the model archive
		#[arg(long, value_enum)]
		collisions: Option<CollisionPolicy>,

		/// Print the bundle report as JSON
		#[arg(long)]
		json: bool,
	},

	/// List the entries of a .tar.gz archive
	Inspect {
		/// Archive to list
		archive: PathBuf,

		/// Print entries as a JSON array
		#[arg(long)]
		json: bool,
	},
}
