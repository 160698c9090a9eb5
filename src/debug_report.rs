use botislav::{Classification, NodeSummary};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_classification(input: &str, run: &Classification, color: bool) {
    let palette = ansi::Palette::new(color);
    let details = &run.details;
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Classifying: \"{}\"", input), ansi::CYAN)));
    println!("   {}", palette.dim(format!("normalized: \"{}\"", run.text)));

    println!("\n{}", palette.paint("━━━ Active rules ━━━", ansi::GRAY));
    if details.active_rules.is_empty() {
        println!("{}", palette.dim("  none (no bucket matched)"));
    } else {
        println!("  {}", palette.paint(details.active_rules.join(", "), ansi::BLUE));
    }

    println!("\n{}", palette.paint("━━━ Saturation ━━━", ansi::GRAY));
    print_saturation(run, &palette);

    println!("\n{}", palette.paint("━━━ Candidates ━━━", ansi::GRAY));
    if details.candidates.is_empty() {
        println!("{}", palette.dim("  No derivation covers the whole phrase"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • Rules were filtered out by their buckets");
        println!("  • Some words are not part of any rule");
        println!("  • Production functions returned None");
        println!("\n{}", palette.dim("  Tip: RUST_LOG=botislav::engine=trace shows rule matching"));
    } else {
        print_candidates(run, &palette);
    }

    println!("\n{}", palette.paint("━━━ Intent ━━━", ansi::GRAY));
    let intent = run.meta.to_string();
    if run.meta.is_fallback() {
        println!("  {} {}", palette.paint(intent, ansi::YELLOW), palette.dim("(fallback)"));
    } else {
        println!("  {}", palette.bold(palette.paint(intent, ansi::GREEN)));
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Saturation: {}  │  Resolve: {}",
        palette.paint(format!("{:?}", details.total), ansi::GREEN),
        palette.paint(format!("{:?}", details.saturation_total), ansi::CYAN),
        palette.dim(format!("{:?}", details.resolve)),
    );
    println!();
}

fn print_saturation(run: &Classification, palette: &ansi::Palette) {
    for pass in &run.details.saturation {
        let label = if pass.pass == 0 { "Pass 0 (regex):".to_string() } else { format!("Pass {}:", pass.pass) };

        println!(
            "  {} {} {}",
            palette.paint(label, ansi::BLUE),
            if pass.produced > 0 {
                palette.paint(format!("✓ {} nodes", pass.produced), ansi::GREEN)
            } else {
                palette.dim(format!("✗ {} nodes", pass.produced))
            },
            palette.dim(format!("(rules seeded {}/{})", pass.rules_seeded, pass.rules_considered))
        );

        for node in pass.samples.iter().take(5) {
            println!("    {}", fmt_node_compact(node, palette));
        }
        if pass.samples.len() > 5 {
            println!("    {}", palette.dim(format!("... +{} more", pass.samples.len() - 5)));
        }
    }
}

fn print_candidates(run: &Classification, palette: &ansi::Palette) {
    for (idx, candidate) in run.details.candidates.iter().enumerate() {
        let marker = if idx == 0 { palette.paint("★", ansi::GREEN) } else { palette.dim("·") };
        println!(
            "  {} {} {} {} {}",
            palette.paint(format!("[{}]", idx), ansi::GRAY),
            marker,
            palette.bold(palette.paint(candidate.intent.to_string(), ansi::GREEN)),
            palette.dim("│ rule:"),
            palette.paint(&candidate.rule, ansi::CYAN),
        );
    }
}

fn fmt_node_compact(node: &NodeSummary, palette: &ansi::Palette) -> String {
    format!(
        "{} {} {}",
        palette.paint(format!("{}..{}", node.start, node.end), ansi::YELLOW),
        palette.paint(&node.rule, ansi::BLUE),
        palette.dim(node.preview.clone())
    )
}
