//! Per-code selection order.
//!
//! Besides pair weights, the user's last explicit choice for a code is
//! remembered as an ordered character list. The chosen character moves to
//! the front; every other character keeps its previous place.

/// Reorder `items` by `preference`.
///
/// Preferred characters that are still among the items come first, in
/// preference order. The remaining items follow in their original order.
/// Preferred characters with no matching item are skipped.
pub fn apply_preference<T, F>(items: Vec<T>, preference: &[String], character: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut rest: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(rest.len());
    for wanted in preference {
        let slot = rest
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|item| character(item) == wanted.as_str()));
        if let Some(item) = slot.and_then(Option::take) {
            out.push(item);
        }
    }
    out.extend(rest.into_iter().flatten());
    out
}

/// `order` with `selected` moved to the front.
pub fn reorder_by_selection(order: &[String], selected: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(order.len() + 1);
    out.push(selected.to_string());
    out.extend(order.iter().filter(|c| c.as_str() != selected).cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn order(items: Vec<String>, preference: &[&str]) -> Vec<String> {
        apply_preference(items, &chars(preference), |c| c.as_str())
    }

    #[test]
    fn preferred_order_comes_first() {
        let reordered = order(chars(&["易", "義", "宜"]), &["義", "宜", "易"]);
        assert_eq!(reordered, chars(&["義", "宜", "易"]));
    }

    #[test]
    fn no_preference_keeps_static_order() {
        let reordered = order(chars(&["易", "義"]), &[]);
        assert_eq!(reordered, chars(&["易", "義"]));
    }

    #[test]
    fn stale_preferred_characters_are_skipped() {
        let reordered = order(chars(&["易", "義"]), &["義", "舊字", "易"]);
        assert_eq!(reordered, chars(&["義", "易"]));
    }

    #[test]
    fn partial_preference_keeps_the_rest_in_place() {
        let reordered = order(chars(&["易", "義", "宜"]), &["宜"]);
        assert_eq!(reordered, chars(&["宜", "易", "義"]));
    }

    #[test]
    fn selection_moves_to_front() {
        let base = chars(&["易", "義", "宜"]);
        assert_eq!(reorder_by_selection(&base, "義"), chars(&["義", "易", "宜"]));
        assert_eq!(reorder_by_selection(&base, "易"), base);
        assert_eq!(reorder_by_selection(&base, "宜"), chars(&["宜", "易", "義"]));
    }

    #[test]
    fn selection_updates_an_existing_preference() {
        let shown = order(chars(&["易", "義", "宜"]), &["義", "易"]);
        assert_eq!(shown, chars(&["義", "易", "宜"]));
        assert_eq!(reorder_by_selection(&shown, "宜"), chars(&["宜", "義", "易"]));
    }
}
