use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::resource::{
    ParameterError, ParameterField, ResourceDefaults, ResourceDraft, ResourceKind, ResourceSpec,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub kind: ResourceKind,
    pub field: ParameterField,
    pub prompt: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionStep {
    NeedsInput(ClarifyingQuestion),
    Complete(ResourceSpec),
}

/// Drives a draft to completion one question at a time. Only presence and
/// type are checked here; semantic validation is left to the CLI.
#[derive(Clone, Debug, Default)]
pub struct ParameterCollector {
    defaults: ResourceDefaults,
}

impl ParameterCollector {
    pub fn new(defaults: ResourceDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    pub fn next_step(&self, draft: &ResourceDraft) -> CollectionStep {
        let kind = draft.kind();
        match draft.complete(&self.defaults) {
            Ok(spec) => CollectionStep::Complete(spec),
            Err(missing) => {
                // complete() only fails with a non-empty list in schema order.
                let field = missing.missing.first().copied().unwrap_or(ParameterField::Name);
                CollectionStep::NeedsInput(ClarifyingQuestion {
                    kind,
                    field,
                    prompt: field.question(kind),
                })
            }
        }
    }

    /// Applies a free-text answer to the pending field, then computes the
    /// next step. A type error leaves the draft untouched.
    pub fn answer(
        &self,
        draft: &mut ResourceDraft,
        field: ParameterField,
        raw: &str,
    ) -> Result<CollectionStep, ParameterError> {
        let value = field.parse_text(raw)?;
        draft.set(field, value)?;
        debug!(
            event_name = "collector.field_answered",
            kind = draft.kind().as_str(),
            field = field.key(),
            remaining = draft.missing_required().len(),
            "parameter answered"
        );
        Ok(self.next_step(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionStep, ParameterCollector};
    use crate::domain::resource::{
        ParameterField, ResourceDefaults, ResourceDraft, ResourceKind, ResourceSpec,
    };

    #[test]
    fn asks_exactly_one_question_per_missing_field_in_schema_order() {
        let collector = ParameterCollector::new(ResourceDefaults::default());

        for kind in ResourceKind::ALL {
            let mut draft = ResourceDraft::new(kind);
            let expected = kind.schema().required.to_vec();
            let mut asked = Vec::new();

            let mut step = collector.next_step(&draft);
            while let CollectionStep::NeedsInput(question) = step {
                assert!(asked.len() <= expected.len(), "collector did not terminate for {kind}");
                asked.push(question.field);
                let answer = if question.field == ParameterField::SizeGb { "64" } else { "x1" };
                step = collector.answer(&mut draft, question.field, answer).expect("valid answer");
            }

            assert_eq!(asked, expected, "{kind}");
            assert!(matches!(step, CollectionStep::Complete(_)));
        }
    }

    #[test]
    fn partially_filled_draft_only_asks_for_what_is_missing() {
        let collector = ParameterCollector::default();
        let mut draft = ResourceDraft::new(ResourceKind::Disk);
        let arguments = serde_json::json!({ "name": "disk01", "resource_group": "rg1" });
        draft.apply_arguments(arguments.as_object().expect("object")).expect("apply");

        let CollectionStep::NeedsInput(question) = collector.next_step(&draft) else {
            panic!("size should still be missing");
        };
        assert_eq!(question.field, ParameterField::SizeGb);
        assert!(question.prompt.contains("GB"));

        let step = collector.answer(&mut draft, ParameterField::SizeGb, "128").expect("answer");
        let CollectionStep::Complete(ResourceSpec::Disk(disk)) = step else {
            panic!("disk should be complete");
        };
        assert_eq!(disk.size_gb, 128);
        assert_eq!(disk.sku, "Standard_LRS");
    }

    #[test]
    fn invalid_answer_keeps_the_same_question_pending() {
        let collector = ParameterCollector::default();
        let mut draft = ResourceDraft::new(ResourceKind::Disk);

        collector
            .answer(&mut draft, ParameterField::SizeGb, "a lot")
            .expect_err("size must be numeric");

        assert!(!draft.is_filled(ParameterField::SizeGb));
        assert_eq!(draft.missing_required().len(), 3);
    }
}
