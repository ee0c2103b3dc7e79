//! Structured markdown document used by the rich editor, and its serializer.
//!
//! `Document::parse` builds a tree with pulldown-cmark; `Document::to_markdown`
//! walks the same tree back to text. Both directions recurse into every
//! container (list items, nested lists, blockquotes, inline spans) so no
//! descendant text is lost when switching editors.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Code(String),
    Link { url: String, title: String, children: Vec<Inline> },
    Image { url: String, title: String, alt: String },
    SoftBreak,
    HardBreak,
    /// Inline HTML or footnote references, kept verbatim.
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Ordered { start: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// `Some` for task items (`- [ ]` / `- [x]`).
    pub checked: Option<bool>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub kind: ListKind,
    /// Tight lists have no blank lines between items.
    pub tight: bool,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph { inlines: Vec<Inline> },
    CodeBlock { language: String, code: String },
    List(List),
    Blockquote { blocks: Vec<Block> },
    ThematicBreak,
    /// Tables, HTML blocks and footnote definitions, kept verbatim.
    Raw(String),
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text(text.into())
    }
}

impl Block {
    /// A paragraph holding a single text run.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph { inlines: vec![Inline::text(text)] }
    }
}

impl ListItem {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { checked: None, blocks }
    }

    pub fn task(checked: bool, blocks: Vec<Block>) -> Self {
        Self { checked: Some(checked), blocks }
    }
}

impl List {
    /// A tight list of the given kind.
    pub fn tight(kind: ListKind, items: Vec<ListItem>) -> Self {
        Self { kind, tight: true, items }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self.kind, ListKind::Ordered { .. })
    }

    /// True when every item carries a checkbox.
    pub fn is_task_list(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.checked.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Parses the full text into a typed tree. Returns an empty document on empty input.
    pub fn parse(text: &str) -> Self {
        let options = Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES;
        let events = Parser::new_ext(text, options).into_offset_iter().collect();
        let mut builder = Builder {
            source: text,
            events,
            pos: 0,
            item: ItemState::default(),
        };

        let mut blocks = builder.blocks();
        // Stray end events only appear on malformed input; keep whatever follows.
        while builder.bump().is_some() {
            blocks.extend(builder.blocks());
        }
        Document { blocks }
    }

    /// Returns the parsed block sequence.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serializes the document back to markdown, without a trailing newline.
    pub fn to_markdown(&self) -> String {
        render_blocks(&self.blocks, "\n\n")
    }

    /// All text content, one line per leaf block.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        collect_block_text(&self.blocks, &mut lines);
        lines.join("\n")
    }
}

/// Per-item flags gathered while walking a list item's direct children.
#[derive(Default)]
struct ItemState {
    checked: Option<bool>,
    paragraph: bool,
}

struct Builder<'a> {
    source: &'a str,
    events: Vec<(Event<'a>, Range<usize>)>,
    pos: usize,
    item: ItemState,
}

impl<'a> Builder<'a> {
    fn peek(&self) -> Option<&Event<'a>> {
        self.events.get(self.pos).map(|(event, _)| event)
    }

    fn bump(&mut self) -> Option<(Event<'a>, Range<usize>)> {
        let next = self.events.get(self.pos).cloned();
        self.pos += 1;
        next
    }

    /// Skips past the end event matching a start event that was just consumed.
    fn skip_to_end(&mut self) {
        let mut depth = 1usize;
        while let Some((event, _)) = self.bump() {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    fn raw(&self, range: Range<usize>) -> String {
        self.source
            .get(range)
            .unwrap_or_default()
            .trim_end_matches('\n')
            .to_string()
    }

    /// Reads blocks until the enclosing container's end event, which is left unconsumed.
    fn blocks(&mut self) -> Vec<Block> {
        let mut blocks = Vec::new();

        loop {
            match self.peek() {
                None | Some(Event::End(_)) => break,
                Some(event) if starts_inline(event) => {
                    let inlines = self.inlines();
                    if !inlines.is_empty() {
                        blocks.push(Block::Paragraph { inlines });
                    }
                    continue;
                }
                Some(_) => {}
            }

            let Some((event, range)) = self.bump() else {
                break;
            };
            match event {
                Event::Start(Tag::Paragraph) => {
                    self.item.paragraph = true;
                    let inlines = self.inlines();
                    self.bump();
                    blocks.push(Block::Paragraph { inlines });
                }
                Event::Start(Tag::Heading { level, .. }) => {
                    let inlines = self.inlines();
                    self.bump();
                    blocks.push(Block::Heading {
                        level: level as u8,
                        inlines,
                    });
                }
                Event::Start(Tag::BlockQuote { .. }) => {
                    let saved = std::mem::take(&mut self.item);
                    let inner = self.blocks();
                    self.item = saved;
                    self.bump();
                    blocks.push(Block::Blockquote { blocks: inner });
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info.to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    let mut code = String::new();
                    while let Some((event, _)) = self.bump() {
                        match event {
                            Event::Text(text) => code.push_str(&text),
                            Event::End(_) => break,
                            _ => {}
                        }
                    }
                    if code.ends_with('\n') {
                        code.pop();
                    }
                    blocks.push(Block::CodeBlock { language, code });
                }
                Event::Start(Tag::List(start)) => blocks.push(Block::List(self.list(start))),
                Event::Start(_) => {
                    blocks.push(Block::Raw(self.raw(range)));
                    self.skip_to_end();
                }
                Event::Rule => blocks.push(Block::ThematicBreak),
                Event::Html(html) => blocks.push(Block::Raw(html.trim_end_matches('\n').to_string())),
                _ => {}
            }
        }

        blocks
    }

    fn list(&mut self, start: Option<u64>) -> List {
        let kind = match start {
            Some(start) => ListKind::Ordered { start },
            None => ListKind::Bullet,
        };
        let mut items = Vec::new();
        let mut loose = false;

        while let Some((event, _)) = self.bump() {
            match event {
                Event::Start(Tag::Item) => {
                    let (item, has_paragraph) = self.item();
                    loose |= has_paragraph;
                    items.push(item);
                }
                Event::End(_) => break,
                _ => {}
            }
        }

        List {
            kind,
            tight: !loose,
            items,
        }
    }

    fn item(&mut self) -> (ListItem, bool) {
        let outer = std::mem::take(&mut self.item);
        let blocks = self.blocks();
        self.bump();
        let state = std::mem::replace(&mut self.item, outer);

        (
            ListItem {
                checked: state.checked,
                blocks,
            },
            state.paragraph,
        )
    }

    /// Reads inline content until an end event or the start of a block.
    fn inlines(&mut self) -> Vec<Inline> {
        let mut inlines: Vec<Inline> = Vec::new();

        loop {
            match self.peek() {
                None | Some(Event::End(_)) | Some(Event::Rule) | Some(Event::Html(_)) => break,
                Some(Event::Start(tag)) if !is_inline_tag(tag) => break,
                _ => {}
            }
            let Some((event, range)) = self.bump() else {
                break;
            };

            let inline = match event {
                Event::Text(text) => {
                    if let Some(Inline::Text(previous)) = inlines.last_mut() {
                        previous.push_str(&text);
                        continue;
                    }
                    Inline::Text(text.to_string())
                }
                Event::Code(code) => Inline::Code(code.to_string()),
                Event::SoftBreak => Inline::SoftBreak,
                Event::HardBreak => Inline::HardBreak,
                Event::TaskListMarker(checked) => {
                    self.item.checked = Some(checked);
                    continue;
                }
                Event::InlineHtml(html) => Inline::Raw(html.to_string()),
                Event::Start(Tag::Strong) => Inline::Strong(self.span()),
                Event::Start(Tag::Emphasis) => Inline::Emphasis(self.span()),
                Event::Start(Tag::Strikethrough) => Inline::Strikethrough(self.span()),
                Event::Start(Tag::Link { dest_url, title, .. }) => Inline::Link {
                    url: dest_url.to_string(),
                    title: title.to_string(),
                    children: self.span(),
                },
                Event::Start(Tag::Image { dest_url, title, .. }) => {
                    let children = self.span();
                    let mut alt = String::new();
                    collect_inline_text(&children, &mut alt);
                    Inline::Image {
                        url: dest_url.to_string(),
                        title: title.to_string(),
                        alt,
                    }
                }
                _ => Inline::Raw(self.raw(range)),
            };
            inlines.push(inline);
        }

        inlines
    }

    /// Children of an inline span whose start event was just consumed.
    fn span(&mut self) -> Vec<Inline> {
        let children = self.inlines();
        if matches!(self.peek(), Some(Event::End(_))) {
            self.bump();
        }
        children
    }
}

fn is_inline_tag(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
    )
}

fn starts_inline(event: &Event) -> bool {
    match event {
        Event::Start(tag) => is_inline_tag(tag),
        Event::Text(_)
        | Event::Code(_)
        | Event::SoftBreak
        | Event::HardBreak
        | Event::InlineHtml(_)
        | Event::FootnoteReference(_)
        | Event::TaskListMarker(_) => true,
        _ => false,
    }
}

fn collect_block_text(blocks: &[Block], lines: &mut Vec<String>) {
    for block in blocks {
        match block {
            Block::Heading { inlines, .. } | Block::Paragraph { inlines } => {
                let mut line = String::new();
                collect_inline_text(inlines, &mut line);
                lines.push(line);
            }
            Block::CodeBlock { code, .. } => lines.push(code.clone()),
            Block::List(list) => {
                for item in &list.items {
                    collect_block_text(&item.blocks, lines);
                }
            }
            Block::Blockquote { blocks } => collect_block_text(blocks, lines),
            Block::ThematicBreak => {}
            Block::Raw(raw) => lines.push(raw.clone()),
        }
    }
}

fn collect_inline_text(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(text) | Inline::Code(text) | Inline::Raw(text) => out.push_str(text),
            Inline::Strong(children)
            | Inline::Emphasis(children)
            | Inline::Strikethrough(children)
            | Inline::Link { children, .. } => collect_inline_text(children, out),
            Inline::Image { alt, .. } => out.push_str(alt),
            Inline::SoftBreak | Inline::HardBreak => out.push(' '),
        }
    }
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

fn render_blocks(blocks: &[Block], separator: &str) -> String {
    let mut out = String::new();
    // (ordered, alternate marker) of the list just written, if any.
    let mut previous_list: Option<(bool, bool)> = None;

    for (index, block) in blocks.iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        if let Block::List(list) = block {
            // Two adjacent lists of the same family need different markers or they merge.
            let alternate = matches!(previous_list, Some((ordered, false)) if ordered == list.is_ordered());
            out.push_str(&render_list(list, alternate));
            previous_list = Some((list.is_ordered(), alternate));
        } else {
            out.push_str(&render_block(block));
            previous_list = None;
        }
    }

    out
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, inlines } => {
            let mut text = String::new();
            render_inlines(inlines, &mut text, false, false, false);
            if text.ends_with('#') {
                text.insert(text.len() - 1, '\\');
            }
            let hashes = "#".repeat((*level).clamp(1, 6) as usize);
            if text.is_empty() {
                hashes
            } else {
                format!("{hashes} {text}")
            }
        }
        Block::Paragraph { inlines } => {
            let mut text = String::new();
            render_inlines(inlines, &mut text, true, true, false);
            text
        }
        Block::CodeBlock { language, code } => {
            let fence = "`".repeat(longest_run(code, '`').max(2) + 1);
            if code.is_empty() {
                format!("{fence}{language}\n{fence}")
            } else {
                format!("{fence}{language}\n{code}\n{fence}")
            }
        }
        Block::List(list) => render_list(list, false),
        Block::Blockquote { blocks } => render_blocks(blocks, "\n\n")
            .split('\n')
            .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
            .collect::<Vec<_>>()
            .join("\n"),
        // `***` rather than `---` so it can never turn a preceding line into a setext heading.
        Block::ThematicBreak => "***".to_string(),
        Block::Raw(raw) => raw.clone(),
    }
}

fn render_list(list: &List, alternate: bool) -> String {
    let separator = if list.tight { "\n" } else { "\n\n" };
    let mut out = String::new();

    for (index, item) in list.items.iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }

        let marker = match list.kind {
            ListKind::Bullet => (if alternate { "*" } else { "-" }).to_string(),
            ListKind::Ordered { start } => {
                format!("{}{}", start + index as u64, if alternate { ')' } else { '.' })
            }
        };
        let indent = " ".repeat(marker.len() + 1);
        let mut first = marker;
        match item.checked {
            Some(true) => first.push_str(" [x]"),
            Some(false) => first.push_str(" [ ]"),
            None => {}
        }

        let body = render_blocks(&item.blocks, separator);
        if body.is_empty() {
            out.push_str(&first);
            if item.checked.is_some() {
                out.push(' ');
            }
            continue;
        }

        // A checkbox is only recognised before paragraph text or on a line of its own.
        if item.checked.is_some() && !matches!(item.blocks.first(), Some(Block::Paragraph { .. })) {
            out.push_str(&first);
            out.push(' ');
            for line in body.split('\n') {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&indent);
                    out.push_str(line);
                }
            }
            continue;
        }

        for (line_index, line) in body.split('\n').enumerate() {
            if line_index == 0 {
                out.push_str(&first);
                out.push(' ');
                out.push_str(line);
            } else {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&indent);
                    out.push_str(line);
                }
            }
        }
    }

    out
}

/// Writes inline content. `line_start` is true when the first inline begins a line and
/// `line_end` when the last one ends it; `in_strong` is true for the direct children of a
/// strong span.
fn render_inlines(inlines: &[Inline], out: &mut String, line_start: bool, line_end: bool, in_strong: bool) {
    let mut at_line_start = line_start;
    let last = inlines.len().saturating_sub(1);

    for (index, inline) in inlines.iter().enumerate() {
        let next = inlines.get(index + 1);
        let next_is_span = matches!(next, Some(Inline::Strong(_) | Inline::Emphasis(_)));

        match inline {
            Inline::Text(text) => {
                let ends_line = match next {
                    None => line_end,
                    Some(next) => matches!(next, Inline::SoftBreak | Inline::HardBreak),
                };
                escape_text(text, at_line_start, ends_line, out);
                if text.ends_with('!') && matches!(next, Some(Inline::Link { .. })) {
                    out.insert(out.len() - 1, '\\');
                }
            }
            Inline::Strong(children) => {
                let underscore = use_underscore(out.chars().last(), leading_char(next), next_is_span);
                render_delimited(out, if underscore { "__" } else { "**" }, children, true);
            }
            Inline::Emphasis(children) => {
                let borders_strong = matches!(children.first(), Some(Inline::Strong(_)))
                    || matches!(children.last(), Some(Inline::Strong(_)))
                    || (in_strong && (index == 0 || index == last));
                let underscore = use_underscore(
                    out.chars().last(),
                    leading_char(next),
                    borders_strong || next_is_span,
                );
                render_delimited(out, if underscore { "_" } else { "*" }, children, false);
            }
            Inline::Strikethrough(children) => render_delimited(out, "~~", children, false),
            Inline::Code(code) => {
                let fence = "`".repeat(longest_run(code, '`') + 1);
                let pad = code.starts_with('`')
                    || code.ends_with('`')
                    || (code.starts_with(' ') && code.ends_with(' ') && !code.trim().is_empty());
                let space = if pad { " " } else { "" };
                out.push_str(&format!("{fence}{space}{code}{space}{fence}"));
            }
            Inline::Link { url, title, children } => {
                out.push('[');
                render_inlines(children, out, false, false, false);
                out.push_str("](");
                push_destination(url, title, out);
                out.push(')');
            }
            Inline::Image { url, title, alt } => {
                out.push_str("![");
                escape_text(alt, false, false, out);
                out.push_str("](");
                push_destination(url, title, out);
                out.push(')');
            }
            Inline::SoftBreak => out.push('\n'),
            Inline::HardBreak => out.push_str("\\\n"),
            Inline::Raw(raw) => out.push_str(raw),
        }
        at_line_start = matches!(inline, Inline::SoftBreak | Inline::HardBreak);
    }
}

/// Whether an emphasis or strong span is delimited with `_` rather than `*`.
///
/// `_` cannot open or close next to a word character. Otherwise it is used when asked
/// for, and whenever a `*` delimiter would run into the `*` just written.
fn use_underscore(before: Option<char>, after: Option<char>, prefer: bool) -> bool {
    let touches_word = before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric);
    if touches_word || before == Some('_') {
        return false;
    }
    prefer || before == Some('*')
}

/// First character an inline renders to, with delimiter spans reported as `*`.
fn leading_char(inline: Option<&Inline>) -> Option<char> {
    match inline? {
        Inline::Text(text) => {
            let mut escaped = String::new();
            escape_text(text, false, false, &mut escaped);
            escaped.chars().next()
        }
        Inline::Strong(_) | Inline::Emphasis(_) => Some('*'),
        Inline::Strikethrough(_) => Some('~'),
        Inline::Code(_) => Some('`'),
        Inline::Link { .. } => Some('['),
        Inline::Image { .. } => Some('!'),
        Inline::SoftBreak => Some('\n'),
        Inline::HardBreak => Some('\\'),
        Inline::Raw(raw) => raw.chars().next(),
    }
}

/// Wraps children in `delimiter`, moving edge whitespace outside so the span still parses.
fn render_delimited(out: &mut String, delimiter: &str, children: &[Inline], strong: bool) {
    let mut inner = String::new();
    render_inlines(children, &mut inner, false, false, strong);

    let trimmed_start = inner.trim_start();
    let leading = &inner[..inner.len() - trimmed_start.len()];
    let trimmed = trimmed_start.trim_end();
    let trailing = &trimmed_start[trimmed.len()..];

    out.push_str(leading);
    if !trimmed.is_empty() {
        out.push_str(delimiter);
        out.push_str(trimmed);
        out.push_str(delimiter);
    }
    out.push_str(trailing);
}

fn push_destination(url: &str, title: &str, out: &mut String) {
    if url.contains([' ', '(', ')', '<', '>']) {
        out.push('<');
        out.push_str(&url.replace('<', "\\<").replace('>', "\\>"));
        out.push('>');
    } else {
        out.push_str(url);
    }
    if !title.is_empty() {
        out.push_str(" \"");
        out.push_str(&title.replace('"', "\\\""));
        out.push('"');
    }
}

fn escape_text(text: &str, line_start: bool, line_end: bool, out: &mut String) {
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;
    let mut end = chars.len();

    if line_start {
        // Leading blanks would be dropped, or read as an indented code block.
        while start < end && matches!(chars[start], ' ' | '\t') {
            push_char_reference(chars[start], out);
            start += 1;
        }
        match chars.get(start) {
            Some('#' | '>' | '-' | '+' | '=') => {
                out.push('\\');
                out.push(chars[start]);
                start += 1;
            }
            Some(c) if c.is_ascii_digit() => {
                let digits = chars[start..].iter().take_while(|c| c.is_ascii_digit()).count();
                let marker = start + digits;
                if digits <= 9 && matches!(chars.get(marker), Some('.' | ')')) {
                    out.extend(&chars[start..marker]);
                    out.push('\\');
                    out.push(chars[marker]);
                    start = marker + 1;
                }
            }
            _ => {}
        }
    }
    if line_end {
        while end > start && matches!(chars[end - 1], ' ' | '\t') {
            end -= 1;
        }
    }

    for index in start..end {
        let c = chars[index];
        let escape = match c {
            '\\' | '`' | '*' | '[' | ']' | '<' | '~' | '|' => true,
            '_' => {
                let inside_word = index > 0
                    && chars[index - 1].is_alphanumeric()
                    && chars.get(index + 1).is_some_and(|next| next.is_alphanumeric());
                !inside_word
            }
            '&' => chars
                .get(index + 1)
                .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '#'),
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }

    // Trailing blanks would be trimmed, or turn a soft break into a hard one.
    for &c in &chars[end..] {
        push_char_reference(c, out);
    }
}

fn push_char_reference(c: char, out: &mut String) {
    out.push_str(&format!("&#{};", u32::from(c)));
}

fn longest_run(text: &str, target: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == target {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
