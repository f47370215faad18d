use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docx_compose::{ComposeConfig, FillRequest, ImageItem, PlaceholderMap, Replacement, Report};

#[derive(Parser)]
#[command(name = "docx-compose", version, about = "Fill, illustrate and merge DOCX report documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill a template with placeholder values, pictures and a table of contents
    Fill {
        /// Template DOCX file
        template: PathBuf,

        /// Output DOCX file (a numeric suffix is added if it exists)
        #[arg(short, long)]
        output: PathBuf,

        /// JSON object of placeholder values; null removes the placeholder
        #[arg(long)]
        values: Option<PathBuf>,

        /// Placeholder value, repeatable
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Picture for a placeholder; repeating a token inserts a list
        #[arg(long = "image", value_name = "TOKEN=PATH[|CAPTION]")]
        images: Vec<String>,

        /// Replace #toc# with a table of contents
        #[arg(long)]
        toc: bool,

        /// Color the #overall_risk_level# value by level
        #[arg(long)]
        risk_color: bool,

        /// Base directory for relative picture paths
        #[arg(long, env = "DOCX_COMPOSE_IMAGE_DIR")]
        image_dir: Option<PathBuf>,
    },
    /// Merge documents in order into one
    Merge {
        /// Input DOCX files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output DOCX file (a numeric suffix is added if it exists)
        #[arg(short, long)]
        output: PathBuf,

        /// Do not insert a page break between documents
        #[arg(long)]
        no_page_breaks: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(report) => {
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", report.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Report, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Fill {
            template,
            output,
            values,
            set,
            images,
            toc,
            risk_color,
            image_dir,
        } => {
            let mut config = ComposeConfig::from_env();
            config.risk_color = risk_color;
            if let Some(dir) = image_dir {
                config.image_base_dir = dir;
            }

            let mut map = match values {
                Some(path) => read_values(&path)?,
                None => PlaceholderMap::new(),
            };
            for pair in &set {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("--set expects KEY=VALUE, got {pair:?}"))?;
                map.insert(key, value);
            }

            let mut request = FillRequest {
                values: map,
                toc,
                config,
                ..FillRequest::default()
            };
            for (token, items) in group_images(&images)? {
                match <[ImageItem; 1]>::try_from(items) {
                    Ok([item]) => request.images.push((token, item)),
                    Err(items) => request.image_lists.push((token, items)),
                }
            }
            Ok(docx_compose::fill_template(&template, &output, &request)?)
        }
        Command::Merge {
            inputs,
            output,
            no_page_breaks,
        } => {
            let mut config = ComposeConfig::from_env();
            config.page_breaks &= !no_page_breaks;
            Ok(docx_compose::merge_documents(&inputs, &output, config.page_breaks)?)
        }
    }
}

fn read_values(path: &std::path::Path) -> Result<PlaceholderMap, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    let serde_json::Value::Object(object) = json else {
        return Err(format!("{}: expected a JSON object", path.display()).into());
    };

    let mut map = PlaceholderMap::new();
    for (key, value) in object {
        let replacement = match value {
            serde_json::Value::Null => Replacement::Remove,
            serde_json::Value::String(s) => Replacement::Text(s),
            serde_json::Value::Array(items) => Replacement::Text(
                items
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            other => Replacement::Text(other.to_string()),
        };
        map.insert(&key, replacement);
    }
    Ok(map)
}

/// `token=path|caption` arguments grouped by token, in first-seen order.
fn group_images(args: &[String]) -> Result<Vec<(String, Vec<ImageItem>)>, String> {
    let mut groups: Vec<(String, Vec<ImageItem>)> = Vec::new();
    for arg in args {
        let (token, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("--image expects TOKEN=PATH[|CAPTION], got {arg:?}"))?;
        let item = match value.split_once('|') {
            Some((path, caption)) => ImageItem::new(path).with_caption(caption),
            None => ImageItem::new(value),
        };
        match groups.iter_mut().find(|(t, _)| t == token) {
            Some((_, items)) => items.push(item),
            None => groups.push((token.to_string(), vec![item])),
        }
    }
    Ok(groups)
}
