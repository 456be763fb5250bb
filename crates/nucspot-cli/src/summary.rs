use console::Style;
use nucspot_core::pipeline::{AnalysisConfig, BatchReport};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    enabled: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            enabled: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow().bold(),
            path: Style::new().underlined(),
        }
    }
}

fn on_off(s: &Styles, flag: bool, on: &str, off: &str) -> String {
    if flag {
        s.enabled.apply_to(on).to_string()
    } else {
        s.disabled.apply_to(off).to_string()
    }
}

pub fn print_analysis_summary(config: &AnalysisConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Nucspot Analysis"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Root"),
        s.path.apply_to(config.root.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Format"),
        s.value.apply_to(format!(".{}", config.format))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(format!(
            "nuclei {}, spots {}",
            config.channels.nuclei, config.channels.spots
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Nuclei"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Closing"),
        s.value.apply_to(format!("disk r={}", config.nucleus.closing_radius))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Area"),
        s.value.apply_to(format!(
            "{}..{} px",
            config.nucleus.min_area, config.nucleus.max_area
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Watershed"),
        s.value.apply_to(format!("h={}", config.nucleus.watershed_tolerance))
    );
    println!();

    println!("  {}", s.header.apply_to("Spots"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("LoG sigma"),
        s.value.apply_to(format!(
            "xy {}, z {}",
            config.spots.sigma_xy, config.spots.sigma_z
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(format!(
            "{}..{}",
            config.spots.threshold.lower, config.spots.threshold.upper
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Volume"),
        s.value.apply_to(format!(
            "{}..{} voxels",
            config.spots.min_volume, config.spots.max_volume
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Edges"),
        on_off(&s, config.spots.exclude_edges, "excluded", "kept")
    );
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Previews"),
        on_off(&s, config.output.write_previews, "on", "off")
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Timeout"),
        s.value.apply_to(format!("{} s", config.gate.timeout_ms / 1000))
    );
    println!();
}

pub fn print_batch_report(report: &BatchReport) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Experiments"),
        s.value.apply_to(report.experiments)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(report.table.len())
    );

    if !report.skipped.is_empty() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Skipped"),
            s.warning.apply_to(report.skipped.len())
        );
        for skipped in &report.skipped {
            println!("    {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    if !report.preview_failures.is_empty() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Previews"),
            s.warning
                .apply_to(format!("{} failed", report.preview_failures.len()))
        );
        for failure in &report.preview_failures {
            println!("    {}: {}", failure.path.display(), failure.reason);
        }
    }

    println!(
        "\n  Summary saved to {}",
        s.path.apply_to(report.summary_path.display())
    );
}
