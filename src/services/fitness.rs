use std::{collections::HashMap, sync::Arc, time::Instant};

use serde_json::Value;

use crate::{
    error::AppResult,
    models::{CourseInfo, CourseRef, FitnessEvaluation, UserProfile},
    services::{
        prompt::{render_prompt, system_instruction},
        providers::{CourseCatalog, GenerationProvider},
        throttle::ThrottledQueue,
        RetryPolicy,
    },
};

/// Scores candidate courses against a student profile through the generation service
pub struct FitnessEvaluator {
    generator: Arc<dyn GenerationProvider>,
    catalog: Arc<dyn CourseCatalog>,
    queue: ThrottledQueue,
    retry: RetryPolicy,
    system_instruction: Arc<str>,
    response_schema: Arc<Value>,
}

impl FitnessEvaluator {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        catalog: Arc<dyn CourseCatalog>,
        queue: ThrottledQueue,
        retry: RetryPolicy,
        language: &str,
    ) -> Self {
        Self {
            generator,
            catalog,
            queue,
            retry,
            system_instruction: system_instruction(language).into(),
            response_schema: Arc::new(FitnessEvaluation::response_schema()),
        }
    }

    /// Evaluates every target course, returning evaluations in target order
    ///
    /// Evaluations are labelled with the target's course code whatever the model
    /// echoes back. One generation call is made per course through the throttled queue. A
    /// response that fails to parse or validate aborts the whole run with
    /// `AppError::SchemaValidation` before the next course is attempted.
    pub async fn evaluate_fit(
        &self,
        profile: &UserProfile,
        targets: &[CourseInfo],
    ) -> AppResult<Vec<FitnessEvaluation>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        profile.validate()?;

        let start = Instant::now();
        let history = self.load_history(profile).await?;

        tracing::info!(
            courses = targets.len(),
            taken = profile.taken_courses.len(),
            "Fitness evaluation started"
        );

        let jobs: Vec<(String, String)> = targets
            .iter()
            .map(|target| (target.course_code.clone(), render_prompt(profile, &history, target)))
            .collect();

        let evaluations = self
            .queue
            .run(jobs, |(course_id, prompt)| {
                let generator = Arc::clone(&self.generator);
                let system = Arc::clone(&self.system_instruction);
                let schema = Arc::clone(&self.response_schema);
                let retry = self.retry;

                async move {
                    retry
                        .run("fitness evaluation", |attempt| {
                            let generator = Arc::clone(&generator);
                            let system = Arc::clone(&system);
                            let schema = Arc::clone(&schema);
                            let prompt = prompt.clone();
                            let course_id = course_id.clone();

                            async move {
                                tracing::debug!(course_id = %course_id, attempt, "Requesting evaluation");
                                let raw = generator.generate(&system, &prompt, &schema).await?;
                                tracing::debug!(course_id = %course_id, response_len = raw.len(), "Evaluation received");
                                let mut evaluation = FitnessEvaluation::parse(&raw, &course_id)?;
                                if evaluation.course_id != course_id {
                                    tracing::debug!(
                                        course_id = %course_id,
                                        echoed = %evaluation.course_id,
                                        "Model echoed a different course id"
                                    );
                                    evaluation.course_id = course_id;
                                }
                                Ok(evaluation)
                            }
                        })
                        .await
                }
            })
            .await?;

        tracing::info!(
            courses = evaluations.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fitness evaluation finished"
        );

        Ok(evaluations)
    }

    /// Catalog entries for the taken courses, keyed by the id as it appears in the profile
    ///
    /// Ids may be course codes or stringified catalog ids. Courses missing from the
    /// catalog are left out and rendered with placeholders.
    async fn load_history(&self, profile: &UserProfile) -> AppResult<HashMap<String, CourseInfo>> {
        let mut history = HashMap::new();

        for course_id in profile.taken_course_ids() {
            if history.contains_key(course_id) {
                continue;
            }
            let course_ref = CourseRef::Raw(course_id.to_string());
            match course_ref.resolve(self.catalog.as_ref()).await? {
                Some(course) => {
                    history.insert(course_id.to_string(), course);
                }
                None => tracing::debug!(course_id = %course_id, "Taken course not in catalog"),
            }
        }

        Ok(history)
    }
}
