use super::error::{BackendError, BackendResult, Support};
use super::factory::{WorkloadFactory, WorkloadRequest};

/// Picks the first factory, in preference order, that supports `request` and leaves the
/// request stamped by it. Returns the index of the chosen factory.
///
/// A `hint` restricts the candidates to the factory with that backend id. Unsupported
/// verdicts fall through to the next candidate; a malformed verdict stops the search.
pub fn select_backend(
    request: &mut WorkloadRequest,
    hint: Option<&str>,
    factories: &[Box<dyn WorkloadFactory>],
) -> BackendResult<usize> {
    let candidates: Vec<usize> = match hint {
        Some(hint) => {
            let pinned: Vec<usize> = factories
                .iter()
                .enumerate()
                .filter(|(_, factory)| factory.backend_id() == hint)
                .map(|(index, _)| index)
                .collect();
            if pinned.is_empty() {
                return Err(BackendError::unsupported(
                    hint,
                    request.operator(),
                    format!(
                        "layer '{}' is pinned to a backend that is not loaded",
                        request.layer_name()
                    ),
                ));
            }
            pinned
        }
        None => (0..factories.len()).collect(),
    };

    let mut rejections = Vec::with_capacity(candidates.len());
    for index in candidates {
        let factory = factories[index].as_ref();
        match request.validate_with(factory) {
            Support::Supported => {
                tracing::debug!(
                    backend = factory.backend_id(),
                    layer = request.layer_name(),
                    operator = %request.operator(),
                    "assigned backend"
                );
                return Ok(index);
            }
            Support::Unsupported(reason) => {
                tracing::warn!(
                    backend = factory.backend_id(),
                    layer = request.layer_name(),
                    operator = %request.operator(),
                    %reason,
                    "backend rejected layer, falling back"
                );
                rejections.push(format!("{}: {reason}", factory.backend_id()));
            }
            Support::Malformed(reason) => {
                return Err(BackendError::malformed(request.layer_name(), reason));
            }
        }
    }

    let backends = factories
        .iter()
        .map(|factory| factory.backend_id())
        .collect::<Vec<_>>()
        .join(", ");
    let reason = if rejections.is_empty() {
        "no backends available".to_string()
    } else {
        rejections.join("; ")
    };
    Err(BackendError::unsupported(backends, request.operator(), reason))
}
