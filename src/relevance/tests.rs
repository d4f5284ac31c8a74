use super::*;
use crate::RagError;
use crate::config::DEFAULT_RELEVANCE_CRITERIA;
use std::sync::Mutex;

/// Answers "Yes" for articles mentioning a keyword and "No" otherwise
struct KeywordGenerator {
    keyword: &'static str,
    prompts: Mutex<Vec<CompletionRequest>>,
}

impl KeywordGenerator {
    fn new(keyword: &'static str) -> Arc<Self> {
        Arc::new(Self {
            keyword,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

impl TextGenerator for KeywordGenerator {
    fn model(&self) -> &str {
        "keyword"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts.lock().expect("lock").push(request.clone());
        if request.prompt.contains(self.keyword) {
            Ok("Yes.".to_string())
        } else {
            Ok("No".to_string())
        }
    }
}

struct ScriptedGenerator(&'static str);

impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn model(&self) -> &str {
        "failing"
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(RagError::Generation("rate limited".to_string()))
    }
}

fn article(id: &str, content: &str) -> Article {
    Article {
        id: id.to_string(),
        headline: format!("Headline {id}"),
        content: content.to_string(),
        url: format!("https://news.example/{id}"),
        publication_date: None,
        section: None,
    }
}

#[test]
fn leading_policy() {
    let policy = AnswerPolicy::Leading;
    assert!(policy.is_relevant("Yes"));
    assert!(policy.is_relevant("yes, it is about the Olympics"));
    assert!(policy.is_relevant("Ja."));
    assert!(policy.is_relevant("  TRUE"));
    assert!(!policy.is_relevant("No"));
    assert!(!policy.is_relevant("No, but yes in part"));
    assert!(!policy.is_relevant(""));
    assert!(!policy.is_relevant("Eyes on Paris"));
}

#[test]
fn contains_policy_keeps_legacy_behavior() {
    let policy = AnswerPolicy::Contains;
    assert!(policy.is_relevant("YES"));
    assert!(policy.is_relevant("No, but yes in part"));
    assert!(policy.is_relevant("Eyes on Paris"));
    assert!(!policy.is_relevant("No"));
}

#[test]
fn policy_serde_names() {
    assert_eq!(AnswerPolicy::default(), AnswerPolicy::Leading);
    let parsed: AnswerPolicy = serde_json::from_str("\"contains\"").expect("parse");
    assert_eq!(parsed, AnswerPolicy::Contains);
    assert_eq!(AnswerPolicy::Leading.to_string(), "leading");
}

#[test]
fn filter_preserves_order() {
    let generator = KeywordGenerator::new("Games");
    let filter = RelevanceFilter::new(generator.clone(), RelevanceConfig::default());
    let articles = vec![
        article("1", "Games: swimmer wins gold"),
        article("2", "Local bakery opens"),
        article("3", "Closing ceremony of the Games"),
    ];

    let kept = filter
        .filter(&articles, filter.criteria())
        .expect("filter");
    let ids: Vec<&str> = kept.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["1", "3"]);
    assert_eq!(generator.prompts.lock().expect("lock").len(), 3);
}

#[test]
fn request_uses_system_prompt_and_criteria() {
    let generator = KeywordGenerator::new("never");
    let filter = RelevanceFilter::new(generator.clone(), RelevanceConfig::default());

    let relevant = filter
        .classify(&article("1", "Budget talks"), DEFAULT_RELEVANCE_CRITERIA)
        .expect("classify");
    assert!(!relevant);

    let prompts = generator.prompts.lock().expect("lock");
    let request = &prompts[0];
    assert_eq!(
        request.system.as_deref(),
        Some("You are an assistant that identifies relevant articles.")
    );
    assert!(request.prompt.contains("the Olympics ('Olympia')"));
    assert!(request.prompt.ends_with("Article: Budget talks"));
    assert!(request.temperature.abs() < f32::EPSILON);
}

#[test]
fn custom_criteria_are_used() {
    let generator = KeywordGenerator::new("climate policy");
    let filter = RelevanceFilter::new(generator, RelevanceConfig::default());

    assert!(
        filter
            .classify(&article("1", "Floods"), "climate policy")
            .expect("classify")
    );
}

#[test]
fn annotate_marks_every_article() {
    let filter = RelevanceFilter::new(
        Arc::new(ScriptedGenerator("Maybe")),
        RelevanceConfig::default(),
    );
    let annotated = filter
        .annotate(&[article("1", "a"), article("2", "b")], "topic")
        .expect("annotate");
    assert_eq!(annotated.len(), 2);
    assert!(annotated.iter().all(|(_, relevant)| !relevant));
}

#[test]
fn contains_policy_from_config() {
    let config = RelevanceConfig {
        policy: AnswerPolicy::Contains,
        ..RelevanceConfig::default()
    };
    let filter = RelevanceFilter::new(Arc::new(ScriptedGenerator("No, yes")), config);
    assert!(filter.classify(&article("1", "a"), "topic").expect("classify"));
}

#[test]
fn backend_errors_fail_fast() {
    let filter = RelevanceFilter::new(Arc::new(FailingGenerator), RelevanceConfig::default());
    let err = filter
        .filter(&[article("1", "a")], "topic")
        .expect_err("backend fails");
    assert!(matches!(err, RagError::Generation(_)));
}
