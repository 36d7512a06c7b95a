//! Terminal rendering of sequencer outputs.
//!
//! Outputs carry the full content of their slot, so text is printed as the
//! suffix not yet shown, and atomic fragments are printed again only when
//! their label changes.

use std::io::{self, Write};

use colored::Colorize;
use portal_core::{Fragment, Output};

#[derive(Debug, PartialEq)]
enum Shown {
    Text(String),
    Label(String),
}

pub struct Renderer<W: Write> {
    out: W,
    index: Option<usize>,
    shown: Option<Shown>,
}

fn label(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Text { content } => content.clone(),
        Fragment::Image { url: Some(url) } => format!("[image] {url}"),
        Fragment::Image { url: None } => "[image] loading...".to_string(),
        Fragment::Structured {
            title,
            detail,
            payload,
        } => {
            let kind = payload
                .as_ref()
                .and_then(|payload| payload.get("type"))
                .and_then(|kind| kind.as_str());
            match kind {
                Some("error") => format!("[error] {}", detail.as_deref().unwrap_or(title)),
                Some("tips") => format!("({title})"),
                Some(kind) => format!("[{kind}] {title}"),
                None => format!("[{title}...]"),
            }
        }
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            index: None,
            shown: None,
        }
    }

    pub fn render(&mut self, output: &Output) -> io::Result<()> {
        if self.index != Some(output.index) {
            if self.index.is_some() {
                writeln!(self.out)?;
            }
            self.index = Some(output.index);
            self.shown = None;
        }

        match &output.fragment {
            Fragment::Text { content } => self.render_text(content)?,
            other => self.render_label(other)?,
        }
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        if self.index.is_some() {
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    fn render_text(&mut self, content: &str) -> io::Result<()> {
        let suffix = match &self.shown {
            Some(Shown::Text(shown)) if content.starts_with(shown.as_str()) => &content[shown.len()..],
            None => content,
            Some(_) => {
                writeln!(self.out)?;
                content
            }
        };
        write!(self.out, "{suffix}")?;
        self.shown = Some(Shown::Text(content.to_string()));
        Ok(())
    }

    fn render_label(&mut self, fragment: &Fragment) -> io::Result<()> {
        let text = label(fragment);
        if self.shown.as_ref() == Some(&Shown::Label(text.clone())) {
            return Ok(());
        }
        if self.shown.is_some() {
            writeln!(self.out)?;
        }

        let styled = if fragment.is_error() {
            text.red().to_string()
        } else if matches!(fragment, Fragment::Structured { payload: None, .. } | Fragment::Image { url: None }) {
            text.dimmed().to_string()
        } else {
            text.cyan().to_string()
        };
        write!(self.out, "{styled}")?;
        self.shown = Some(Shown::Label(text));
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
