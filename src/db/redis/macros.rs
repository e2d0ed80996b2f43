/// Read-through lookup of a catalog entry in [`Cache`](crate::db::Cache).
///
/// Expands to an `AppResult` expression. A hit returns the cached value. On a
/// miss `$block` is awaited and its value, `None` included, is queued for the
/// background writer under `$key` for `$ttl` seconds. Cache read errors and
/// errors from `$block` propagate with `?`.
///
/// ```rust,ignore
/// async fn course_by_code(&self, code: &str) -> AppResult<Option<CourseInfo>> {
///     cached!(
///         self.cache,
///         CacheKey::CourseCode(code.to_string()),
///         self.cache_ttl,
///         async move {
///             let mut conn = self.acquire().await?;
///             let course = sqlx::query_as::<_, CourseInfo>(COURSE_BY_CODE)
///                 .bind(code)
///                 .fetch_optional(&mut *conn)
///                 .await?;
///             Ok::<_, AppError>(course)
///         }
///     )
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(hit) = $cache.get_from_cache(&$key).await? {
            Ok(hit)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
