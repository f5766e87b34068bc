use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docstamp::annotate::AnnotationService;
use docstamp::compare::{prepare_candidate, ComparisonEngine, ReferencePage, ThresholdPolicy};
use docstamp::compare::scorer::PerceptualScorer;
use docstamp::config::Config;
use docstamp::db::Database;
use docstamp::export::{export_catalog, export_report, ExportFormat};
use docstamp::fields::{parse_xlsx, FieldService};
use docstamp::render::rasterize::{pdf_page_count, probe, RasterCache};
use docstamp::render::Renderer;
use docstamp::logging;
use docstamp::storage::{sha256_hex, FileStore};

fn print_help() {
    println!(
        r#"docstamp - document template annotation, generation and comparison

USAGE:
    docstamp [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    templates                         List stored templates
    import <pdf> --name NAME          Store a PDF as an annotatable template
    classify --template ID --page N --kind variable|reference [--note TEXT]
                                      Classify one template page
    annotations --template ID [--page N]
                                      List a template's annotations
    catalog [--export PATH]           Show the variable catalog
    fields <sheet.xlsx> [--save-group NAME]
                                      Parse a field-definition spreadsheet
    groups [--show ID | --reparse ID | --delete ID]
           [--add-file PATH --group ID | --delete-file ID]
                                      Manage spreadsheet-driven field groups
    refdocs [--add PATH --name NAME | --delete ID]
                                      Manage registered comparison documents
    render <artifact> [--set K=V]... [--out DIR]
                                      Substitute {{{{name}}}} placeholders
    overlay --template ID [--set K=V]... [--out DIR]
                                      Draw values onto an annotated template
    compare --template ID <candidate> [--export PATH]
                                      Compare a document against a template

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    DOCSTAMP_LOG        Log level (trace, debug, info, warn, error)
"#
    );
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" if command.is_empty() => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("docstamp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => command.push(other.to_string()),
        }
        i += 1;
    }

    Cli {
        config_path,
        command,
    }
}

/// Collect repeated `--set key=value` pairs.
fn parse_values(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--set" {
            let pair = args
                .get(i + 1)
                .context("--set requires a key=value argument")?;
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("'{pair}' is not of the form key=value"))?;
            values.insert(key.to_string(), value.to_string());
            i += 1;
        }
        i += 1;
    }
    Ok(values)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn positional(args: &[String]) -> Option<&String> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = true;
            continue;
        }
        return Some(arg);
    }
    None
}

fn require_template_id(args: &[String]) -> Result<i64> {
    flag_value(args, "--template")
        .context("--template ID is required")?
        .parse()
        .context("--template takes a numeric id")
}

fn main() -> Result<()> {
    let cli = parse_args();

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init(None)?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    let files = FileStore::new(&config.storage.data_dir);

    let Some((command, rest)) = cli.command.split_first() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "templates" => cmd_templates(&db, &files),
        "import" => cmd_import(&db, &files, &config, rest),
        "classify" => cmd_classify(&db, &files, rest),
        "annotations" => cmd_annotations(&db, &files, rest),
        "catalog" => cmd_catalog(&db, &files, rest),
        "fields" => cmd_fields(&db, rest),
        "groups" => cmd_groups(&db, rest),
        "refdocs" => cmd_refdocs(&db, &files, rest),
        "render" => cmd_render(&config, rest),
        "overlay" => cmd_overlay(&db, &files, &config, rest),
        "compare" => cmd_compare(&db, &files, &config, rest),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn cmd_templates(db: &Database, files: &FileStore) -> Result<()> {
    let service = AnnotationService::new(db, files);
    let templates = service.list_templates()?;
    if templates.is_empty() {
        println!("No templates stored yet. Use `docstamp import` to add one.");
        return Ok(());
    }
    for template in templates {
        let counts = service.page_kind_counts(template.id)?;
        println!(
            "#{:<4} {:<30} {:>3} pages (variable {}, reference {}, undefined {})  updated {}",
            template.id,
            template.name,
            template.total_pages,
            counts.variable,
            counts.reference,
            counts.undefined,
            template.updated_at
        );
    }
    Ok(())
}

fn cmd_import(db: &Database, files: &FileStore, config: &Config, args: &[String]) -> Result<()> {
    let pdf_path = positional(args).context("import requires a PDF path")?;
    let pdf_path = Path::new(pdf_path);
    let name = flag_value(args, "--name").context("--name is required")?;
    let description = flag_value(args, "--description").unwrap_or("");

    let rasterizer = probe().context(
        "no PDF rasterizer available; install poppler-utils (pdftoppm) or mupdf-tools (mutool)",
    )?;
    let cache = RasterCache::new(&config.rasterizer.cache_dir, rasterizer);
    let total_pages = pdf_page_count(pdf_path)?;
    let key = format!("import_{}", sha256_hex(pdf_path)?);

    let mut pages = Vec::with_capacity(total_pages as usize);
    for page_number in 1..=total_pages {
        let page_path = cache.page_image(&key, pdf_path, page_number, config.rasterizer.dpi)?;
        pages.push(image::open(&page_path).with_context(|| {
            format!("decoding rasterized page {}", page_path.display())
        })?);
    }

    let pdf_bytes = std::fs::read(pdf_path)
        .with_context(|| format!("reading {}", pdf_path.display()))?;
    let service = AnnotationService::new(db, files);
    let id = service.save_template(name, description, &pdf_bytes, &pages)?;
    println!("Imported '{name}' as template #{id} ({total_pages} pages, {} dpi)", config.rasterizer.dpi);
    Ok(())
}

fn cmd_classify(db: &Database, files: &FileStore, args: &[String]) -> Result<()> {
    let template_id = require_template_id(args)?;
    let page: u32 = flag_value(args, "--page")
        .context("--page N is required")?
        .parse()
        .context("--page takes a number")?;
    let kind = match flag_value(args, "--kind").context("--kind is required")? {
        "variable" => docstamp::db::PageKind::Variable,
        "reference" => docstamp::db::PageKind::Reference,
        other => bail!("unknown page kind '{other}' (expected variable or reference)"),
    };
    let note = flag_value(args, "--note").unwrap_or("");

    let service = AnnotationService::new(db, files);
    service.set_page_kind(template_id, page, kind, note)?;
    let info = service.get_page_info(template_id, page)?;
    println!(
        "Template #{template_id} page {page} -> {}{}",
        info.kind.as_str(),
        if info.note.is_empty() {
            String::new()
        } else {
            format!(" ({})", info.note)
        }
    );
    Ok(())
}

fn cmd_annotations(db: &Database, files: &FileStore, args: &[String]) -> Result<()> {
    let template_id = require_template_id(args)?;
    let page = flag_value(args, "--page")
        .map(|p| p.parse::<u32>().context("--page takes a number"))
        .transpose()?;

    let service = AnnotationService::new(db, files);
    let annotations = service.list_annotations(template_id, page)?;
    if annotations.is_empty() {
        println!("No annotations found.");
        return Ok(());
    }
    for ann in annotations {
        println!(
            "#{:<4} page {:<3} {:<20} [{}] ({:.0},{:.0})-({:.0},{:.0}) sample='{}'",
            ann.id,
            ann.page_number,
            ann.variable_name,
            ann.variable_kind.as_str(),
            ann.bbox.x_start,
            ann.bbox.y_start,
            ann.bbox.x_end,
            ann.bbox.y_end,
            ann.sample_value
        );
    }
    Ok(())
}

fn cmd_catalog(db: &Database, files: &FileStore, args: &[String]) -> Result<()> {
    let service = AnnotationService::new(db, files);
    let entries = service.variable_catalog()?;
    if let Some(path) = flag_value(args, "--export") {
        let path = Path::new(path);
        export_catalog(&entries, path, ExportFormat::from_path(path)?)?;
        println!("Catalog exported to {}", path.display());
        return Ok(());
    }
    if entries.is_empty() {
        println!("The variable catalog is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<20} [{}] used {:>3}x  samples: {}",
            entry.variable_name,
            entry.variable_kind.as_str(),
            entry.usage_count,
            entry.sample_values.join(", ")
        );
    }
    Ok(())
}

fn cmd_fields(db: &Database, args: &[String]) -> Result<()> {
    let sheet = positional(args).context("fields requires a spreadsheet path")?;
    let fields = parse_xlsx(Path::new(sheet))?;
    println!("Parsed {} field(s):", fields.len());
    for field in &fields {
        let options = if field.dropdown_options.is_empty() {
            String::new()
        } else {
            format!("  options: {}", field.dropdown_options.join(" / "))
        };
        println!(
            "{:>3}. {:<20} default='{}'{}",
            field.sort_order + 1,
            field.name,
            field.default_value,
            options
        );
    }

    if let Some(group_name) = flag_value(args, "--save-group") {
        let service = FieldService::new(db);
        let group_id = service.create_group(group_name, Path::new(sheet), &fields, &[])?;
        println!("Saved as field group #{group_id}");
    }
    Ok(())
}

fn cmd_groups(db: &Database, args: &[String]) -> Result<()> {
    let service = FieldService::new(db);

    if let Some(group_id) = flag_value(args, "--show") {
        let group_id: i64 = group_id.parse().context("--show takes a numeric id")?;
        for field in service.definitions(group_id)? {
            let options = if field.dropdown_options.is_empty() {
                String::new()
            } else {
                format!("  options: {}", field.dropdown_options.join(" / "))
            };
            println!(
                "{:>3}. {:<20} default='{}'{}",
                field.sort_order + 1,
                field.name,
                field.default_value,
                options
            );
        }
        for file in service.files(group_id)? {
            println!("file #{:<4} {} ({}, {} bytes)", file.id, file.filename, file.file_type, file.file_size);
        }
        return Ok(());
    }

    if let Some(group_id) = flag_value(args, "--reparse") {
        let group_id: i64 = group_id.parse().context("--reparse takes a numeric id")?;
        let group = service
            .list_groups()?
            .into_iter()
            .find(|g| g.id == group_id)
            .with_context(|| format!("field group {group_id} does not exist"))?;
        let fields = parse_xlsx(Path::new(&group.source_sheet_path))?;
        service.replace_definitions(group_id, &fields)?;
        println!("Re-parsed {} field(s) for group '{}'", fields.len(), group.name);
        return Ok(());
    }

    if let Some(group_id) = flag_value(args, "--delete") {
        let group_id: i64 = group_id.parse().context("--delete takes a numeric id")?;
        service.delete_group(group_id)?;
        println!("Deleted field group #{group_id}");
        return Ok(());
    }

    if let Some(file_id) = flag_value(args, "--delete-file") {
        let file_id: i64 = file_id.parse().context("--delete-file takes a numeric id")?;
        service.delete_file(file_id)?;
        println!("Deleted template file #{file_id}");
        return Ok(());
    }

    if let Some(path) = flag_value(args, "--add-file") {
        let group_id: i64 = flag_value(args, "--group")
            .context("--add-file needs --group ID")?
            .parse()
            .context("--group takes a numeric id")?;
        let file = service.register_file(Path::new(path))?;
        let file_id = db.add_template_file(group_id, &file)?;
        println!("Added '{}' to group #{group_id} as file #{file_id}", file.filename);
        return Ok(());
    }

    let groups = service.list_groups()?;
    if groups.is_empty() {
        println!("No field groups yet. Use `docstamp fields <sheet.xlsx> --save-group NAME`.");
        return Ok(());
    }
    for group in groups {
        println!(
            "#{:<4} {:<30} {} file(s)  source {}  created {}",
            group.id, group.name, group.file_count, group.source_sheet_path, group.created_at
        );
    }
    Ok(())
}

fn cmd_refdocs(db: &Database, files: &FileStore, args: &[String]) -> Result<()> {
    if let Some(path) = flag_value(args, "--add") {
        let source = Path::new(path);
        let name = flag_value(args, "--name").context("--add needs --name NAME")?;
        let filename = source
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .context("--add needs a path to a file")?;
        let kind = docstamp::db::FileKind::from_path(source)
            .with_context(|| format!("unsupported comparison document type: {filename}"))?;

        let bytes = std::fs::read(source)
            .with_context(|| format!("reading {}", source.display()))?;
        let stored = files.save(&format!("comparison/{filename}"), &bytes)?;
        let id = db.insert_comparison_template(
            name,
            &filename,
            &stored.to_string_lossy(),
            kind.as_str(),
            bytes.len() as u64,
        )?;
        println!("Registered comparison document '{name}' as #{id}");
        return Ok(());
    }

    if let Some(id) = flag_value(args, "--delete") {
        let id: i64 = id.parse().context("--delete takes a numeric id")?;
        if let Some(doc) = db.get_comparison_template(id)? {
            let path = Path::new(&doc.filepath);
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("removing {}", doc.filepath))?;
            }
            db.delete_comparison_template(id)?;
            println!("Deleted comparison document '{}'", doc.name);
        } else {
            println!("No comparison document #{id}");
        }
        return Ok(());
    }

    let docs = db.list_comparison_templates()?;
    if docs.is_empty() {
        println!("No comparison documents registered.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "#{:<4} {:<30} {} ({}, {} bytes)  added {}",
            doc.id, doc.name, doc.filename, doc.file_type, doc.file_size, doc.created_at
        );
    }
    Ok(())
}

fn cmd_render(config: &Config, args: &[String]) -> Result<()> {
    let artifact = positional(args).context("render requires an artifact path")?;
    let values = parse_values(args)?;
    let output_dir = flag_value(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.output_dir.clone());

    let renderer = Renderer::new(&config.render, config.rasterizer.dpi);
    let outcome = renderer.render_placeholders(Path::new(artifact), &values, &output_dir)?;
    println!(
        "Wrote {} ({} substitution(s))",
        outcome.output_path.display(),
        outcome.substitutions
    );
    if !outcome.unresolved.is_empty() {
        println!("Unresolved tokens: {}", outcome.unresolved.join(", "));
    }
    Ok(())
}

fn cmd_overlay(db: &Database, files: &FileStore, config: &Config, args: &[String]) -> Result<()> {
    let template_id = require_template_id(args)?;
    let values = parse_values(args)?;
    let output_dir = flag_value(args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.output_dir.clone());

    let service = AnnotationService::new(db, files);
    let template = service
        .template_info(template_id)?
        .with_context(|| format!("template {template_id} does not exist"))?;
    let annotations = service.list_annotations(template_id, None)?;
    let pdf_path = files.resolve(&FileStore::template_pdf_name(template_id));

    let renderer = Renderer::new(&config.render, config.rasterizer.dpi);
    let outcome =
        renderer.render_pdf_overlay(&pdf_path, &annotations, &values, &output_dir)?;
    println!(
        "Wrote {} ({} value(s) placed on '{}')",
        outcome.output_path.display(),
        outcome.substitutions,
        template.name
    );
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn cmd_compare(db: &Database, files: &FileStore, config: &Config, args: &[String]) -> Result<()> {
    let template_id = require_template_id(args)?;
    let candidate = positional(args).context("compare requires a candidate document path")?;

    let service = AnnotationService::new(db, files);
    let template = service
        .template_info(template_id)?
        .with_context(|| format!("template {template_id} does not exist"))?;

    let mut reference = Vec::with_capacity(template.total_pages as usize);
    for page_number in 1..=template.total_pages {
        let info = service.get_page_info(template_id, page_number)?;
        let annotations = match info.kind {
            docstamp::db::PageKind::Variable => {
                service.list_annotations(template_id, Some(page_number))?
            }
            docstamp::db::PageKind::Reference => Vec::new(),
        };
        reference.push(ReferencePage {
            page_number,
            kind: info.kind,
            image_path: files.resolve(&FileStore::template_page_name(template_id, page_number)),
            annotations,
        });
    }

    let cache = probe().map(|r| RasterCache::new(&config.rasterizer.cache_dir, r));
    let candidate_pages =
        prepare_candidate(Path::new(candidate), cache.as_ref(), config.rasterizer.dpi)?;

    let mut engine = ComparisonEngine::new(
        Box::new(PerceptualScorer::new(config.compare.hash_size)),
        ThresholdPolicy::new(config.compare.reference_threshold),
    );
    let report = engine.run(&reference, &candidate_pages)?;

    println!(
        "Overall similarity vs '{}': {:.1}%",
        template.name, report.overall_similarity
    );
    for page in &report.pages {
        println!(
            "  page {:<3} [{}] {:>5.1}%  {}",
            page.page_number,
            page.kind.as_str(),
            page.score,
            if page.pass { "pass" } else { "FAIL" }
        );
    }
    for variable in &report.variables {
        println!(
            "    {:<20} {:>5.1}%  {}",
            variable.variable_name,
            variable.score,
            if variable.pass { "pass" } else { "FAIL" }
        );
    }
    if !report.missing_pages.is_empty() {
        println!(
            "Missing pages: {}",
            report
                .missing_pages
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    if let Some(path) = flag_value(args, "--export") {
        let path = Path::new(path);
        export_report(&report, path, ExportFormat::from_path(path)?)?;
        println!("Report exported to {}", path.display());
    }
    Ok(())
}
