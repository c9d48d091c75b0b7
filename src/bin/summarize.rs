use clap::Parser;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tube_summarizer::controller::{SummaryController, SummaryView, ThumbnailImage, UiEvent};
use tube_summarizer::telemetry;

static BLOCK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, li").expect("Failed to parse block selector"));

/// Summarize YouTube videos through a running summarizer server.
#[derive(Parser, Debug)]
#[command(name = "summarize", version)]
struct Args {
    /// Origin of the summarizer server
    #[arg(long, env = "SUMMARIZER_URL", default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Video URL to summarize. Without it, every line on stdin is submitted.
    url: Option<String>,
}

#[derive(Default)]
struct TerminalView {
    input: String,
}

impl SummaryView for TerminalView {
    fn input_value(&self) -> String {
        self.input.clone()
    }

    fn set_status_text(&mut self, text: &str) {
        println!("{}", text);
    }

    fn set_status_html(&mut self, html: &str) {
        let text = render_markup(html);
        if !text.is_empty() {
            println!("{}", text);
        }
    }

    fn clear_thumbnails(&mut self) {}

    fn append_thumbnail(&mut self, image: ThumbnailImage) {
        println!("[{}] {}", image.alt, image.src);
    }
}

/// Flattens the summary fragment into terminal lines: paragraphs as-is,
/// list items as bullets.
fn render_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);

    let lines: Vec<String> = fragment
        .select(&BLOCK_SELECTOR)
        .map(|element| {
            let text = element.text().collect::<String>();
            let text = text.trim();
            if element.value().name() == "li" {
                format!("  • {}", text)
            } else {
                text.to_string()
            }
        })
        .collect();

    if lines.is_empty() {
        return fragment.root_element().text().collect::<String>().trim().to_string();
    }
    lines.join("\n")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();
    let args = Args::parse();

    let controller = SummaryController::new(&args.server)?;
    let mut view = TerminalView::default();

    if let Some(url) = args.url {
        view.input = url;
        controller.handle_event(&UiEvent::Click, &mut view).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        view.input = line;
        controller
            .handle_event(&UiEvent::KeyDown("Enter".to_string()), &mut view)
            .await;
    }

    Ok(())
}
