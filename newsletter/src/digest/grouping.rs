use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::email::digest_message::DigestMessage;
use crate::prompt::summarizer::{bullet_lines, summarize_bullets};
use crate::prompt::{Completer, CostLedger, GenerationParams};

static RE_SENDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*"?([^"<]*?)"?\s*<[^>]+>\s*$"#).unwrap());

/// `"Name" <addr>` and `Name <addr>` yield `Name`; anything else is
/// returned trimmed.
pub fn sender_display_name(raw: &str) -> String {
    RE_SENDER_NAME
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| raw.trim())
        .to_string()
}

/// Groups messages by sender, keeping first-seen order of groups and of
/// messages within each group.
pub fn group_by_sender(messages: &[DigestMessage]) -> IndexMap<String, Vec<&DigestMessage>> {
    let mut groups: IndexMap<String, Vec<&DigestMessage>> = IndexMap::new();
    for message in messages {
        groups
            .entry(message.sender_name.clone())
            .or_default()
            .push(message);
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bullet {
    /// Id of the message this bullet summarizes.
    pub message_id: String,
    pub text: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderGroup {
    pub name: String,
    pub bullets: Vec<Bullet>,
}

/// Intermediate bullet-list document fed to the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulletDocument {
    pub groups: Vec<SenderGroup>,
}

impl BulletDocument {
    /// Summarizes every message, one completion call each, in group order.
    /// Messages whose summary fails contribute nothing.
    pub async fn build(
        completer: &impl Completer,
        groups: &IndexMap<String, Vec<&DigestMessage>>,
        body_chars: usize,
        params: GenerationParams,
        ledger: &mut CostLedger,
    ) -> Self {
        let mut document = BulletDocument::default();
        for (name, messages) in groups {
            for message in messages {
                let outcome = summarize_bullets(
                    completer,
                    &message.subject,
                    &message.from,
                    &message.body,
                    &message.id,
                    body_chars,
                    params,
                )
                .await;
                ledger.record("summarize", outcome.usage.as_ref());
                document.push_message(name, message, bullet_lines(&outcome.bullet_block));
            }
        }
        tracing::info!(
            "Bullet document: {} group(s), {} bullet(s)",
            document.groups.len(),
            document.bullet_count()
        );
        document
    }

    /// Appends the bullets of one message to `group`, creating the group
    /// on first use. Every bullet links back to `message`.
    pub fn push_message(&mut self, group: &str, message: &DigestMessage, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        let link = message.deep_link();
        let bullets = lines.into_iter().map(|text| Bullet {
            message_id: message.id.clone(),
            text,
            links: vec![link.clone()],
        });

        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(existing) => existing.bullets.extend(bullets),
            None => self.groups.push(SenderGroup {
                name: group.to_string(),
                bullets: bullets.collect(),
            }),
        }
    }

    pub fn bullets(&self) -> impl Iterator<Item = &Bullet> {
        self.groups.iter().flat_map(|g| g.bullets.iter())
    }

    /// One link list per bullet, in flattened document order.
    pub fn link_lists(&self) -> Vec<Vec<String>> {
        self.bullets().map(|b| b.links.clone()).collect()
    }

    pub fn bullet_count(&self) -> usize {
        self.bullets().count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn render(&self) -> String {
        self.groups
            .iter()
            .map(|group| {
                let items = group
                    .bullets
                    .iter()
                    .map(|b| format!("<li>{}</li>", b.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("<h2>{}</h2>\n<ul>\n{}\n</ul>", group.name, items)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{digest_message, ScriptedCompleter};

    #[test]
    fn test_sender_display_name() {
        assert_eq!(
            sender_display_name("Lenny Rachitsky <lenny@substack.com>"),
            "Lenny Rachitsky"
        );
        assert_eq!(
            sender_display_name("\"The Information\" <noreply@theinformation.com>"),
            "The Information"
        );
        assert_eq!(sender_display_name("noreply@a16z.com"), "noreply@a16z.com");
        assert_eq!(sender_display_name("<only@address.com>"), "<only@address.com>");
    }

    #[test]
    fn test_group_by_sender_keeps_encounter_order() {
        let messages = vec![
            digest_message("1", "B <b@x.com>", "b1", "", 0),
            digest_message("2", "A <a@x.com>", "a1", "", 0),
            digest_message("3", "B <b2@x.com>", "b2", "", 0),
        ];

        let groups = group_by_sender(&messages);

        let names: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(names, vec!["B", "A"]);
        let b_ids: Vec<_> = groups["B"].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(b_ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_build_skips_failed_summaries() {
        let messages = vec![
            digest_message("1", "B <b@x.com>", "good", "", 0),
            digest_message("2", "A <a@x.com>", "broken", "", 0),
            digest_message("3", "B <b@x.com>", "also good", "", 0),
        ];
        let completer = ScriptedCompleter::new()
            .reply_when("Subject: broken", "[Error: 500]")
            .otherwise("<b>Lead:</b> one\n<b>Next:</b> two");
        let params = GenerationParams {
            max_output_units: 400,
            temperature: 0.3,
        };
        let mut ledger = CostLedger::new();

        let groups = group_by_sender(&messages);
        let doc = BulletDocument::build(&completer, &groups, 4000, params, &mut ledger).await;

        assert_eq!(doc.groups.len(), 1);
        assert_eq!(doc.groups[0].name, "B");
        assert_eq!(doc.bullet_count(), 4);
        assert_eq!(doc.link_lists().len(), 4);
        assert_eq!(ledger.len(), 2);
        assert_eq!(completer.prompts().len(), 3);
    }

    #[test]
    fn test_link_lists_align_with_bullets() {
        let m1 = digest_message("1", "B <b@x.com>", "b1", "", 0);
        let m2 = digest_message("2", "A <a@x.com>", "a1", "", 0);
        let mut doc = BulletDocument::default();
        doc.push_message("B", &m1, vec!["one".to_string(), "two".to_string()]);
        doc.push_message("A", &m2, vec![]);
        doc.push_message("A", &m2, vec!["three".to_string()]);

        let lists = doc.link_lists();
        assert_eq!(lists.len(), doc.bullet_count());
        assert_eq!(lists[0], vec![m1.deep_link()]);
        assert_eq!(lists[1], vec![m1.deep_link()]);
        assert_eq!(lists[2], vec![m2.deep_link()]);
        assert_eq!(
            doc.render(),
            "<h2>B</h2>\n<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n<h2>A</h2>\n<ul>\n<li>three</li>\n</ul>"
        );
    }
}
