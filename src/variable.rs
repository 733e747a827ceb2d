use ndarray::Array1;

/// The iterate being optimized over.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    value: Array1<f64>,
}

impl Variable {
    pub fn new(x0: Array1<f64>) -> Self {
        Self { value: x0 }
    }

    /// Moves the iterate by `step` in place.
    pub fn update(&mut self, step: &Array1<f64>) {
        self.value += step;
    }

    pub fn value(&self) -> &Array1<f64> {
        &self.value
    }

    pub fn dimension(&self) -> usize {
        self.value.len()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::Variable;
    use ndarray::array;

    #[test]
    fn update_adds_the_step() {
        let mut var = Variable::new(array![1.0, -2.0]);
        var.update(&array![0.5, 0.5]);
        assert_eq!(var.value(), &array![1.5, -1.5]);
        assert_eq!(var.dimension(), 2);
        assert_eq!(var.into_inner(), array![1.5, -1.5]);
    }
}
