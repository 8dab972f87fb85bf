//! Developer utility to evaluate a saved forest against a CSV dataset.

use std::path::PathBuf;

use cvd_forest::config::TARGET_COLUMN;
use cvd_forest::dataset::loader::load_csv;
use cvd_forest::ml::persist::load_model;
use cvd_forest::pipeline::evaluate;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    model_path: PathBuf,
    data_path: PathBuf,
    target: String,
    top: usize,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let model = load_model(&options.model_path).map_err(|err| err.to_string())?;
    let dataset = load_csv(&options.data_path, &options.target).map_err(|err| err.to_string())?;
    let eval = evaluate(&model, &dataset).map_err(|err| err.to_string())?;

    println!(
        "model: {} trees, {} features",
        model.trees.len(),
        model.n_features()
    );
    println!("rows: {}", dataset.n_rows());
    println!("accuracy: {:.4}", eval.accuracy);
    println!("roc auc: {:.4}", eval.roc_auc);
    println!();
    println!("{}", eval.report);

    println!("confusion matrix (rows=true, cols=pred):");
    let mut header = format!("{:>8}", "");
    for label in &eval.confusion.classes {
        header.push_str(&format!("{label:>8}"));
    }
    println!("{header}");
    for (truth, label) in eval.confusion.classes.iter().enumerate() {
        let mut row = format!("{label:>8}");
        for pred in 0..eval.confusion.n_classes() {
            row.push_str(&format!("{:>8}", eval.confusion.get(truth, pred)));
        }
        println!("{row}");
    }

    println!();
    println!("Top features by importance:");
    for (name, importance) in model.ranked_features().into_iter().take(options.top) {
        println!("- {name:<24} {importance:.4}");
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut model_path: Option<PathBuf> = None;
    let mut data_path: Option<PathBuf> = None;
    let mut target = TARGET_COLUMN.to_string();
    let mut top = 10usize;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                data_path = Some(PathBuf::from(value));
            }
            "--target" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--target requires a value".to_string())?;
                target = value.to_string();
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                top = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let model_path = model_path.ok_or_else(|| "--model is required".to_string())?;
    let data_path = data_path.ok_or_else(|| "--data is required".to_string())?;
    Ok(CliOptions {
        model_path,
        data_path,
        target,
        top,
    })
}

fn help_text() -> String {
    [
        "cvd-forest-eval",
        "",
        "Scores a saved random forest against a CSV dataset.",
        "",
        "Usage:",
        "  cvd-forest-eval --model <rf_cvd.pkl> --data <file.csv> [options]",
        "",
        "Options:",
        "  --target <column>  Label column (default: cvd_any).",
        "  --top <n>          Number of features to list by importance (default: 10).",
    ]
    .join("\n")
}
