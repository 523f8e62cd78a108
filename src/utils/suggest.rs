/// Closest candidate to `target` within a small edit distance, for
/// "did you mean" hints on unknown names.
pub fn find_best_match<'c, I>(target: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'c str>,
{
    let threshold = if target.chars().count() < 3 { 1 } else { 3 };
    let mut best: Option<(usize, &str)> = None;

    for candidate in candidates {
        if candidate == target {
            continue;
        }
        let distance = levenshtein_distance(target, candidate);
        if distance <= threshold && best.is_none_or(|(min, _)| distance < min) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, candidate)| candidate.to_string())
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s2_chars: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=s2_chars.len()).collect();
    let mut current = vec![0; s2_chars.len() + 1];

    for (i, char1) in s1.chars().enumerate() {
        current[0] = i + 1;
        for (j, char2) in s2_chars.iter().enumerate() {
            let cost = usize::from(char1 != *char2);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[s2_chars.len()]
}
