//! Offline demo conversation exercising every fragment shape without a
//! provider.

use std::time::Duration;

use async_trait::async_trait;
use portal_core::{
    Fragment, FragmentGenerator, GeneratedFragment, Message, Sequencer, Task, TaskOutcome,
    TaskResult,
};
use serde_json::json;

const DEMO_REPLY: &str = r#"Fine, thank you!
# Title

\[
    a=2
\]

$$a=3$$

- one
- two

```rust
println!("hello");
```
"#;

const TEXT_STEP: usize = 2;

#[derive(Debug, Clone)]
pub enum DemoItem {
    /// Streamed a couple of characters per pull.
    Text(String),
    /// Shown as a loading placeholder first, then in full.
    Atomic(Fragment),
}

fn loading(fragment: &Fragment) -> Fragment {
    match fragment {
        Fragment::Image { .. } => Fragment::image_pending(),
        Fragment::Structured { title, .. } => Fragment::structured(title.clone(), None),
        Fragment::Text { .. } => Fragment::structured("", None),
    }
}

pub fn default_items() -> Vec<DemoItem> {
    vec![
        DemoItem::Text(DEMO_REPLY.to_string()),
        DemoItem::Atomic(Fragment::image("https://example.com/image.jpg")),
        DemoItem::Atomic(Fragment::structured(
            "Test.docx",
            Some(json!({
                "type": "Word",
                "payload": {
                    "main": [
                        { "value": "Hello World", "size": 10 },
                        { "value": "\n", "size": 10 },
                        {
                            "level": "first",
                            "type": "title",
                            "value": "",
                            "valueList": [{ "value": "Hello World", "size": 20 }]
                        }
                    ]
                }
            })),
        )),
    ]
}

pub struct DemoGenerator {
    items: Vec<DemoItem>,
    item: usize,
    offset: usize,
    placeholder_shown: bool,
    delay: Duration,
    last: Option<GeneratedFragment>,
}

impl DemoGenerator {
    pub fn new(items: Vec<DemoItem>) -> Self {
        Self {
            items,
            item: 0,
            offset: 0,
            placeholder_shown: false,
            delay: Duration::from_millis(100),
            last: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn step(&mut self) -> GeneratedFragment {
        let index = self.item;
        let Some(current) = self.items.get(index) else {
            return match &self.last {
                Some(last) if !last.fragment.is_text() => last.clone(),
                Some(last) => GeneratedFragment::last(Fragment::text(""), last.relative_index),
                None => GeneratedFragment::last(Fragment::text(""), 0),
            };
        };

        let (fragment, finished_item, replace) = match current {
            DemoItem::Text(content) => {
                let piece: String = content.chars().skip(self.offset).take(TEXT_STEP).collect();
                self.offset += TEXT_STEP;
                (Fragment::text(piece), self.offset >= content.chars().count(), false)
            }
            DemoItem::Atomic(fragment) if !self.placeholder_shown => {
                self.placeholder_shown = true;
                (loading(fragment), false, true)
            }
            DemoItem::Atomic(fragment) => (fragment.clone(), true, true),
        };

        if finished_item {
            self.item += 1;
            self.offset = 0;
            self.placeholder_shown = false;
        }

        let mut step = GeneratedFragment::new(fragment, index);
        step.done = self.item >= self.items.len();
        step.replace = replace;
        step
    }
}

#[async_trait]
impl FragmentGenerator for DemoGenerator {
    async fn next_fragment(&mut self) -> TaskResult<GeneratedFragment> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self.step();
        self.last = Some(step.clone());
        Ok(step)
    }
}

/// Single-task sequence replaying `items`.
pub fn demo_sequence(turns: Vec<Message>, items: Vec<DemoItem>, delay: Duration) -> Sequencer {
    let generator = DemoGenerator::new(items).with_delay(delay);
    Sequencer::new(turns)
        .with_stream(true)
        .with_task(Task::ready("demo", TaskOutcome::streamed(generator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::drain;

    fn items() -> Vec<DemoItem> {
        vec![
            DemoItem::Text("Hello".to_string()),
            DemoItem::Atomic(Fragment::image("https://example.com/a.png")),
            DemoItem::Atomic(Fragment::structured("Report.docx", Some(json!({"type": "Word"})))),
        ]
    }

    #[tokio::test]
    async fn streams_text_then_placeholders_then_artifacts() {
        let mut sequence = demo_sequence(vec![], items(), Duration::ZERO);
        let outputs = drain(&mut sequence).await;

        let shown: Vec<(usize, Fragment)> = outputs
            .iter()
            .map(|output| (output.index, output.fragment.clone()))
            .collect();
        assert_eq!(
            shown,
            vec![
                (0, Fragment::text("He")),
                (0, Fragment::text("Hell")),
                (0, Fragment::text("Hello")),
                (1, Fragment::image_pending()),
                (1, Fragment::image("https://example.com/a.png")),
                (2, Fragment::structured("Report.docx", None)),
                (2, Fragment::structured("Report.docx", Some(json!({"type": "Word"})))),
            ]
        );
        assert!(outputs.last().unwrap().done);
        assert_eq!(sequence.buffer().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_generator_stays_done() {
        let mut generator = DemoGenerator::new(vec![DemoItem::Text("ab".into())])
            .with_delay(Duration::ZERO);
        let first = generator.next_fragment().await.unwrap();
        assert!(first.done);
        let again = generator.next_fragment().await.unwrap();
        assert!(again.done);
        assert_eq!(again.fragment, Fragment::text(""));

        let mut generator = DemoGenerator::new(vec![DemoItem::Atomic(Fragment::image("u"))])
            .with_delay(Duration::ZERO);
        generator.next_fragment().await.unwrap();
        generator.next_fragment().await.unwrap();
        let again = generator.next_fragment().await.unwrap();
        assert!(again.done && again.replace);
        assert_eq!(again.fragment, Fragment::image("u"));
    }

    #[tokio::test]
    async fn default_script_ends_with_document() {
        let mut sequence = demo_sequence(vec![], default_items(), Duration::ZERO);
        let outputs = drain(&mut sequence).await;
        let last = outputs.last().unwrap();
        assert_eq!(last.index, 2);
        assert!(matches!(&last.fragment, Fragment::Structured { title, .. } if title == "Test.docx"));
        assert!(sequence.buffer().get(0).unwrap().as_text().unwrap().starts_with("Fine, thank you!"));
    }
}
